use std::{fmt::Display, path::PathBuf};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use futures::{future, StreamExt};

use crate::{
    cli::output::{
        collect_for, extract_days,
        summary::{summarize, UsageSummary},
    },
    cli::report::{parse_filter_spec, DateStyle, Granularity},
    daemon::storage::record_storage::RecordStorageImpl,
    utils::dir::create_application_default_path,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Table,
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Table => write!(f, "table"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ExportCommand {
    #[arg(long, short, default_value_t = ExportFormat::Csv)]
    format: ExportFormat,
    #[arg(long, short, help = "Write to a file instead of stdout")]
    out: Option<PathBuf>,
    #[arg(
        long,
        help = "Restrict the export to a calendar window. Without it the whole history is exported"
    )]
    filter: Option<Granularity>,
    #[arg(long, short, help = "Reference point of the window, see `report`")]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk)]
    date_style: DateStyle,
}

/// Command to process `export`. Produces the per-domain two-column report
/// the dashboard's export buttons produce: csv for spreadsheets, an aligned
/// text table for everything else.
pub async fn process_export_command(
    ExportCommand {
        format,
        out,
        filter,
        date,
        date_style,
    }: ExportCommand,
) -> Result<()> {
    let storage = RecordStorageImpl::new(create_application_default_path()?.join("records"))?;

    let records = match filter {
        Some(filter) => collect_for(&storage, parse_filter_spec(filter, date, date_style)?).await,
        None => {
            let days = futures::stream::iter(storage.list_days()?);
            extract_days(&storage, days)
                .filter_map(|v| future::ready(v.ok()))
                .collect()
                .await
        }
    };

    let summary = summarize(&records);
    if summary.per_domain_seconds.is_empty() {
        anyhow::bail!("No data available for export");
    }

    let rendered = match format {
        ExportFormat::Csv => render_csv(&summary),
        ExportFormat::Table => render_table(&summary),
    };

    match out {
        Some(path) => std::fs::write(path, rendered)?,
        None => print!("{rendered}"),
    }
    Ok(())
}

pub fn render_csv(summary: &UsageSummary) -> String {
    let mut csv = String::from("Website,Time Spent\n");
    for usage in &summary.per_domain_seconds {
        csv.push_str(&format!("{},{}\n", usage.domain, humanize_duration(usage.seconds)));
    }
    csv
}

pub fn render_table(summary: &UsageSummary) -> String {
    let width = summary
        .per_domain_seconds
        .iter()
        .map(|u| u.domain.len())
        .chain(["Website".len()])
        .max()
        .unwrap_or_default();

    let mut table = format!("{:width$}  Time Spent\n", "Website");
    for usage in &summary.per_domain_seconds {
        table.push_str(&format!(
            "{:width$}  {}\n",
            usage.domain,
            humanize_duration(usage.seconds)
        ));
    }
    table
}

/// Spells a duration out the way the report reads best: "45 sec",
/// "2 min 5 sec", "1 hr 2 min". Zero remainders are dropped.
pub fn humanize_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{seconds} sec")
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        let remaining = seconds % 60;
        if remaining > 0 {
            format!("{minutes} min {remaining} sec")
        } else {
            format!("{minutes} min")
        }
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes > 0 {
            format!("{hours} hr {minutes} min")
        } else {
            format!("{hours} hr")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cli::output::summary::DomainUsage;

    use super::*;

    fn sample_summary() -> UsageSummary {
        UsageSummary {
            total_seconds: 3725 + 65,
            distinct_domain_count: 2,
            per_domain_seconds: vec![
                DomainUsage {
                    domain: "a.com".into(),
                    seconds: 3725,
                },
                DomainUsage {
                    domain: "b.com".into(),
                    seconds: 65,
                },
            ],
            hourly: [0; 24],
        }
    }

    #[test]
    fn humanizes_durations() {
        assert_eq!(humanize_duration(45), "45 sec");
        assert_eq!(humanize_duration(60), "1 min");
        assert_eq!(humanize_duration(125), "2 min 5 sec");
        assert_eq!(humanize_duration(3600), "1 hr");
        assert_eq!(humanize_duration(3725), "1 hr 2 min");
    }

    #[test]
    fn csv_has_the_contract_header_and_one_row_per_domain() {
        let csv = render_csv(&sample_summary());
        assert_eq!(
            csv,
            "Website,Time Spent\n\
             a.com,1 hr 2 min\n\
             b.com,1 min 5 sec\n"
        );
    }

    #[test]
    fn table_aligns_the_same_two_columns() {
        let table = render_table(&sample_summary());
        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("Website  Time Spent"));
        assert_eq!(lines.next(), Some("a.com    1 hr 2 min"));
        assert_eq!(lines.next(), Some("b.com    1 min 5 sec"));
    }
}
