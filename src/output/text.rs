//! Human-readable run summary.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::actions::{DedupReport, ReplaceOutcome};
use crate::duplicates::ScanSummary;

/// Write the end-of-run summary.
///
/// Groups are listed with their master and every duplicate's status;
/// per-file reasons are only shown for duplicates that were left alone.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_summary<W: Write>(
    writer: &mut W,
    summary: &ScanSummary,
    report: &DedupReport,
) -> io::Result<()> {
    for group in &report.groups {
        writeln!(
            writer,
            "{} x {} ({})",
            group.records.len() + 1,
            ByteSize::b(group.size),
            &group.digest.to_hex()[..16]
        )?;
        writeln!(writer, "  master       {}", group.master.display())?;
        for record in &group.records {
            match &record.result {
                Err(e) => writeln!(
                    writer,
                    "  {:<12} {} ({e})",
                    record.status(),
                    record.duplicate.display()
                )?,
                Ok(_) => writeln!(writer, "  {:<12} {}", record.status(), record.duplicate.display())?,
            }
        }
    }
    if !report.groups.is_empty() {
        writeln!(writer)?;
    }

    writeln!(
        writer,
        "Scanned {} files ({}) in {:.2?}",
        summary.total_files,
        summary.total_size_display(),
        summary.scan_duration
    )?;
    writeln!(
        writer,
        "{} files shared a size, {} hashed, {} duplicate groups",
        summary.candidate_files, summary.hashed_files, summary.duplicate_groups
    )?;

    if report.dry_run {
        writeln!(
            writer,
            "Dry run: would reclaim {} by cloning {} files",
            ByteSize::b(report.would_reclaim),
            report
                .groups
                .iter()
                .flat_map(|g| &g.records)
                .filter(|r| matches!(r.result, Ok(ReplaceOutcome::WouldClone { .. })))
                .count()
        )?;
    } else {
        writeln!(
            writer,
            "Cloned {}, already shared {}, skipped {}, failed {}",
            report.cloned, report.already_shared, report.skipped, report.failed
        )?;
        writeln!(
            writer,
            "Reclaimed {} MB ({})",
            report.reclaimed_megabytes(),
            report.reclaimed_display()
        )?;
    }

    let errors = summary.scan_errors.len() + summary.hash_errors.len();
    if errors > 0 {
        writeln!(writer, "{errors} files could not be read (use -v for details)")?;
    }
    if report.attribute_warnings > 0 {
        writeln!(
            writer,
            "{} attributes could not be restored",
            report.attribute_warnings
        )?;
    }
    if summary.interrupted || report.interrupted {
        writeln!(writer, "Interrupted before completion")?;
    }
    Ok(())
}
