use clap::{Subcommand, ValueEnum};
use focustally_core::{Config, Granularity, StatsSeries};

use super::{open_engine, parse_date, print_json};

#[derive(Clone, Copy, ValueEnum)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl From<Period> for Granularity {
    fn from(period: Period) -> Self {
        match period {
            Period::Daily => Granularity::Daily,
            Period::Weekly => Granularity::Weekly,
            Period::Monthly => Granularity::Monthly,
            Period::Yearly => Granularity::Yearly,
        }
    }
}

#[derive(Subcommand)]
pub enum StatsAction {
    /// Minutes per slot of one bucket
    Series {
        /// Bucket granularity
        #[arg(value_enum)]
        period: Period,
        /// Topic ID
        #[arg(long)]
        topic: String,
        /// Any day inside the bucket (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Render values as H.MM hours
        #[arg(long)]
        hours: bool,
    },
    /// Focus time of one topic on one day
    Today {
        /// Topic ID
        #[arg(long)]
        topic: String,
        /// Day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Cross-topic rollup
    Rollup,
}

pub async fn run(action: StatsAction, config: &Config, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(config)?;

    match action {
        StatsAction::Series {
            period,
            topic,
            date,
            hours,
        } => {
            let date = parse_date(date.as_deref())?;
            let series: StatsSeries = match Granularity::from(period) {
                Granularity::Daily => engine.daily_stats(user, &topic, date).await,
                Granularity::Weekly => engine.weekly_stats(user, &topic, date).await,
                Granularity::Monthly => engine.monthly_stats(user, &topic, date).await,
                Granularity::Yearly => engine.yearly_stats(user, &topic, date).await,
            };
            if hours {
                print_json(&serde_json::json!({
                    "labels": series.labels,
                    "data": series.hour_labels(),
                }))?;
            } else {
                print_json(&series)?;
            }
        }
        StatsAction::Today { topic, date } => {
            let date = parse_date(date.as_deref())?;
            let ms = engine.today_focus_ms(user, &topic, date).await;
            print_json(&serde_json::json!({
                "date": date.to_string(),
                "topicId": topic,
                "focusMs": ms,
            }))?;
        }
        StatsAction::Rollup => {
            print_json(&engine.rollup(user).await)?;
        }
    }
    Ok(())
}
