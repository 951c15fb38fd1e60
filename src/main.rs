use std::sync::Arc;

use cdbpool::{Cluster, Context, Driver, DriverOptions, Value};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cdbpool")]
#[command(about = "Run ad-hoc statements against a cdbpool proxy", long_about = None)]
struct Args {
    /// Connection string, e.g. tcp(127.0.0.1:9123)/orders?timeout=5s
    #[arg(long)]
    dsn: String,

    /// Logical database; defaults to the one named in the DSN
    #[arg(long, default_value = "")]
    database: String,

    /// Shard key the statement is routed with
    #[arg(long)]
    shard_key: u64,

    /// Route to the offline replica
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an insert, update or delete
    Exec {
        sql: String,
        /// `?` arguments: null, true/false, numbers, else strings
        args: Vec<String>,
    },
    /// Run a select and print the rows tab-separated
    Query { sql: String, args: Vec<String> },
}

fn parse_arg(raw: &str) -> Value {
    match raw {
        "null" | "NULL" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(v) = raw.parse::<i64>() {
                Value::Int(v)
            } else if let Ok(v) = raw.parse::<u64>() {
                Value::UInt(v)
            } else if let Some(v) = raw.parse::<f64>().ok().filter(|v| v.is_finite()) {
                Value::Float(v)
            } else {
                Value::Text(raw.to_string())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cdbpool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let driver = Arc::new(Driver::new(DriverOptions::default()));
    let cluster = Cluster::new(driver, &args.dsn)?;
    let db = cluster.db(&Context::background(), &args.database, args.shard_key, args.offline);

    let outcome = match &args.command {
        Command::Exec { sql, args } => {
            let values: Vec<Value> = args.iter().map(|a| parse_arg(a)).collect();
            db.exec(sql, &values).await.map(|result| {
                println!("rows_affected\t{}", result.rows_affected);
                println!("last_insert_id\t{}", result.last_insert_id);
            })
        }
        Command::Query { sql, args } => {
            let values: Vec<Value> = args.iter().map(|a| parse_arg(a)).collect();
            db.query(sql, &values).await.map(|rows| {
                if !rows.columns().is_empty() {
                    println!("{}", rows.columns().join("\t"));
                }
                for row in rows {
                    let cells: Vec<String> = row
                        .into_values()
                        .into_iter()
                        .map(|cell| match cell {
                            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                            None => "NULL".to_string(),
                        })
                        .collect();
                    println!("{}", cells.join("\t"));
                }
            })
        }
    };

    cluster.close().await;
    outcome?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("null"), Value::Null);
        assert_eq!(parse_arg("true"), Value::Bool(true));
        assert_eq!(parse_arg("-12"), Value::Int(-12));
        assert_eq!(parse_arg("18446744073709551615"), Value::UInt(u64::MAX));
        assert_eq!(parse_arg("2.5"), Value::Float(2.5));
        assert_eq!(parse_arg("O'Brien"), Value::Text("O'Brien".to_string()));
    }

    #[test]
    fn test_parse_arg_non_finite_words_stay_text() {
        for word in ["nan", "NaN", "inf", "-inf", "infinity"] {
            assert_eq!(parse_arg(word), Value::Text(word.to_string()));
        }
        assert_eq!(parse_arg("1e3"), Value::Float(1000.0));
    }
}
