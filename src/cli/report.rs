use std::fmt::Display;

use anyhow::Result;
use chrono::{Datelike, Duration, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    cli::output::{
        collect_for,
        summary::{summarize, FilterSpec, UsageSummary},
    },
    daemon::storage::record_storage::RecordStorageImpl,
    utils::{
        dir::create_application_default_path,
        percentage::{duration_percentage, Percentage},
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long,
        short,
        default_value_t = Granularity::Day,
        help = "Calendar window of the report"
    )]
    filter: Granularity,
    #[arg(
        long,
        short,
        help = "Reference point of the window. For days examples are \"yesterday\", \"15/03/2025\". Months take \"2025-03\", years \"2025\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(short = 'p', long = "percentage", help = "Hide websites below the specified share of total time", default_value_t = Percentage::new_opt(0.).unwrap())]
    min_percentage: Percentage,
}

/// Command to process `report`. Renders the dashboard numbers for one
/// calendar window: totals, ranking and the hourly activity histogram.
pub async fn process_report_command(
    ReportCommand {
        filter,
        date,
        date_style,
        min_percentage,
    }: ReportCommand,
) -> Result<()> {
    let spec = parse_filter_spec(filter, date, date_style)?;

    let storage = RecordStorageImpl::new(create_application_default_path()?.join("records"))?;
    let records = collect_for(&storage, spec).await;
    let summary = summarize(&records);

    render_dashboard(&spec, &summary, min_percentage);
    Ok(())
}

/// Turns the cli arguments into a concrete calendar window, defaulting to
/// the current day/month/year.
pub fn parse_filter_spec(
    filter: Granularity,
    date: Option<String>,
    date_style: DateStyle,
) -> Result<FilterSpec> {
    let today = Local::now().date_naive();
    let validation_error = |message: String| -> anyhow::Error {
        Args::command()
            .error(clap::error::ErrorKind::ValueValidation, message)
            .into()
    };

    match filter {
        Granularity::Day => {
            let day = match date {
                None => today,
                Some(s) => parse_date_string(&s, Local::now(), date_style.into())
                    .map_err(|e| validation_error(format!("Failed to validate date {e}")))?
                    .date_naive(),
            };
            Ok(FilterSpec::Day(day))
        }
        Granularity::Month => match date {
            None => Ok(FilterSpec::Month {
                year: today.year(),
                month: today.month(),
            }),
            Some(s) => {
                let first = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
                    .map_err(|e| validation_error(format!("Months take the form 2025-03: {e}")))?;
                Ok(FilterSpec::Month {
                    year: first.year(),
                    month: first.month(),
                })
            }
        },
        Granularity::Year => match date {
            None => Ok(FilterSpec::Year(today.year())),
            Some(s) => {
                let year = s
                    .trim()
                    .parse::<i32>()
                    .map_err(|e| validation_error(format!("Years take the form 2025: {e}")))?;
                Ok(FilterSpec::Year(year))
            }
        },
    }
}

fn render_dashboard(spec: &FilterSpec, summary: &UsageSummary, min_percentage: Percentage) {
    let bold = ansi_term::Style::new().bold();

    println!(
        "{}: {}",
        bold.paint(total_time_label(spec)),
        format_duration(Duration::seconds(summary.total_seconds as i64))
    );
    println!(
        "{}: {}",
        bold.paint("Websites Visited"),
        summary.distinct_domain_count
    );
    println!(
        "{}: {}",
        bold.paint("Most Active Hours"),
        format_active_hour(summary.most_active_hour())
    );

    if summary.per_domain_seconds.is_empty() {
        return;
    }

    println!();
    let total = Duration::seconds(summary.total_seconds as i64);
    for (rank, usage) in summary.per_domain_seconds.iter().enumerate() {
        let duration = Duration::seconds(usage.seconds as i64);
        let share = duration_percentage(duration, total);
        if share < min_percentage {
            continue;
        }
        println!(
            "{}\t{}%\t{}\t{}",
            rank + 1,
            *share as i32,
            format_duration(duration),
            usage.domain
        );
    }

    println!();
    for (hour, seconds) in summary.hourly.iter().enumerate() {
        if *seconds > 0 {
            println!(
                "{}\t{}",
                hour_range_label(hour as u32),
                format_duration(Duration::seconds(*seconds as i64))
            );
        }
    }
}

fn total_time_label(spec: &FilterSpec) -> String {
    match *spec {
        FilterSpec::Day(day) if day == Local::now().date_naive() => "Total Time Today".into(),
        FilterSpec::Day(day) => format!("Total Time on {}", day.format("%x")),
        FilterSpec::Month { year, month } => {
            let first = NaiveDate::from_ymd_opt(year, month, 1)
                .expect("month filters are validated at parse time");
            format!("Total Time for the Month of {} {year}", first.format("%B"))
        }
        FilterSpec::Year(year) => format!("Total Time for the Year {year}"),
    }
}

fn format_active_hour(hour: Option<u32>) -> String {
    match hour {
        Some(hour) => hour_range_label(hour),
        None => "N/A".into(),
    }
}

fn hour_range_label(hour: u32) -> String {
    format!("{hour}:00 - {hour}:59")
}

pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_month_and_year_references() {
        let spec = parse_filter_spec(Granularity::Month, Some("2025-03".into()), DateStyle::Uk)
            .unwrap();
        assert_eq!(spec, FilterSpec::Month { year: 2025, month: 3 });

        let spec = parse_filter_spec(Granularity::Year, Some("2024".into()), DateStyle::Uk).unwrap();
        assert_eq!(spec, FilterSpec::Year(2024));

        assert!(parse_filter_spec(Granularity::Month, Some("march".into()), DateStyle::Uk).is_err());
    }

    #[test]
    fn parses_day_references_in_both_styles() {
        let spec = parse_filter_spec(Granularity::Day, Some("15/03/2025".into()), DateStyle::Uk)
            .unwrap();
        assert_eq!(
            spec,
            FilterSpec::Day(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
        );

        let spec = parse_filter_spec(Granularity::Day, Some("03/15/2025".into()), DateStyle::Us)
            .unwrap();
        assert_eq!(
            spec,
            FilterSpec::Day(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
        );
    }

    #[test]
    fn defaults_to_the_current_window() {
        let today = Local::now().date_naive();

        let spec = parse_filter_spec(Granularity::Day, None, DateStyle::Uk).unwrap();
        assert_eq!(spec, FilterSpec::Day(today));

        let spec = parse_filter_spec(Granularity::Year, None, DateStyle::Uk).unwrap();
        assert_eq!(spec, FilterSpec::Year(today.year()));
    }

    #[test]
    fn durations_format_compactly() {
        assert_eq!(format_duration(Duration::seconds(45)), "45s");
        assert_eq!(format_duration(Duration::seconds(125)), "2m5s");
        assert_eq!(format_duration(Duration::seconds(3725)), "1h2m5s");
    }

    #[test]
    fn active_hour_renders_range_or_sentinel() {
        assert_eq!(format_active_hour(Some(9)), "9:00 - 9:59");
        assert_eq!(format_active_hour(None), "N/A");
    }
}
