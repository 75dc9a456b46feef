use clap::{value_parser, Arg, ArgAction, Command};
use env_logger::Env;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use volley::err::Result;
use volley::http::{self, HttpProbe};
use volley::load::{self, LoadPlan};
use volley::{Aggregator, Context, Summary};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let url = matches.get_one::<String>("url").expect("required");
    let requests = *matches.get_one::<u64>("requests").expect("default");
    let workers = *matches.get_one::<usize>("workers").expect("default");
    let rate = *matches.get_one::<u32>("rate").expect("default");
    let timeout = *matches.get_one::<u64>("timeout").expect("default");
    let queue = matches.get_one::<usize>("queue").copied().unwrap_or(workers);

    info!("volley - {}", env!("CARGO_PKG_VERSION"));
    info!("URL {}", url);

    let ctx = match matches.get_one::<u64>("deadline") {
        Some(secs) => Context::with_timeout(Duration::from_secs(*secs)),
        None => Context::new(),
    };
    let plan = LoadPlan::new(requests, workers)
        .with_rate(rate)
        .with_queue_capacity(queue);
    let probe = HttpProbe::new(url.as_str(), Duration::from_secs(timeout))?;

    let summary = load::run(
        &plan,
        &ctx,
        Arc::new(probe),
        Aggregator::with_classifier(http::is_success),
    )?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("\n=== SUMMARY ===");
    print_rows(&summary.rows());

    match summary.latency_rows() {
        Some(rows) => {
            println!("\n=== LATENCY ===");
            print_rows(&rows);
        }
        None => println!("\nNo successful requests"),
    }
    println!();
}

fn print_rows(rows: &[(String, String)]) {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, value) in rows {
        println!("{:<width$}  {}", label, value, width = width);
    }
}

fn cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about("Send a burst of HTTP requests through a worker pool and report latency")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .required(true)
                .help("Target URL to stress test"),
        )
        .arg(
            Arg::new("requests")
                .short('n')
                .long("requests")
                .value_name("COUNT")
                .default_value("50")
                .value_parser(value_parser!(u64))
                .help("How many requests to send"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("COUNT")
                .default_value("10")
                .value_parser(value_parser!(usize))
                .help("How many workers to use"),
        )
        .arg(
            Arg::new("rate")
                .short('r')
                .long("rate")
                .value_name("RPS")
                .default_value("0")
                .value_parser(value_parser!(u32))
                .help("Maximum requests per second, 0 for unlimited"),
        )
        .arg(
            Arg::new("queue")
                .short('q')
                .long("queue")
                .value_name("CAPACITY")
                .value_parser(value_parser!(usize))
                .help("Jobs waiting for a worker before submission blocks [default: workers]"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECS")
                .default_value("30")
                .value_parser(value_parser!(u64))
                .help("Per-request timeout in seconds"),
        )
        .arg(
            Arg::new("deadline")
                .short('d')
                .long("deadline")
                .value_name("SECS")
                .value_parser(value_parser!(u64))
                .help("Stop submitting after this many seconds"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the summary as JSON"),
        )
}
