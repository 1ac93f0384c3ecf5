use market_snapshot::config::Config;
use market_snapshot::scrapers::yahoo::YahooScraper;
use market_snapshot::services::pipeline::PipelineService;

use anyhow::Context;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{error, info};
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = App::new("market_snapshot")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Download hourly stock snapshots to CSV and chart the latest one");

    // 全局参数，子命令中同样可用
    let app = app
        .arg(
            Arg::with_name("tickers")
                .short('t')
                .long("tickers")
                .value_name("TICKERS")
                .help("Comma separated ticker list (default META,AAPL,AMZN,NFLX,GOOG)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("period")
                .short('p')
                .long("period")
                .value_name("PERIOD")
                .help("History window requested from the provider (1d, 5d, 1mo, ...)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("interval")
                .short('i')
                .long("interval")
                .value_name("INTERVAL")
                .help("Bar size requested from the provider (1h, 30m, 1d, ...)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("no-adjust")
                .long("no-adjust")
                .help("Keep raw prices and the Adj Close column")
                .takes_value(false)
                .global(true),
        )
        .arg(
            Arg::with_name("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Directory snapshots are written to and read from")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("read-dir")
                .long("read-dir")
                .value_name("DIR")
                .help("Directory the latest snapshot is read from (overrides --data-dir)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("plot-dir")
                .long("plot-dir")
                .value_name("DIR")
                .help("Directory charts are written to")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("anchor")
                .long("anchor")
                .value_name("HH:MM")
                .help("Time of day that marks the start of a trading day on the chart")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("timezone")
                .long("timezone")
                .value_name("TZ")
                .help("Timezone used for chart tick labels (default UTC)")
                .takes_value(true)
                .global(true),
        );

    // 添加子命令
    let app = app
        .subcommand(SubCommand::with_name("ingest").about("Download a snapshot and save it as CSV"))
        .subcommand(SubCommand::with_name("render").about("Chart the latest saved snapshot as PNG"))
        .subcommand(SubCommand::with_name("list").about("List saved snapshot files"));

    let matches = app.get_matches();

    if let Err(e) = run(&matches).await {
        error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    // 全局参数会传递到子命令的匹配结果中
    let args = matches.subcommand().map(|(_, sub)| sub).unwrap_or(matches);
    let config = build_config(args)?;
    config.validate()?;

    info!("Tracking tickers: {}", config.tickers.join(", "));

    let scraper = Arc::new(YahooScraper::new()?);
    let service = PipelineService::new(config, scraper);

    match matches.subcommand_name() {
        Some("ingest") => {
            service.ingest_and_save().await.context("ingestion failed")?;
        }
        Some("render") => {
            service.load_and_render().context("rendering failed")?;
        }
        Some("list") => {
            let names = service.list_snapshots()?;
            if names.is_empty() {
                info!("No snapshots in {}", service.config().read_dir.display());
            }
            for name in names {
                info!("{}", name);
            }
        }
        _ => {
            // 未指定子命令：先下载再绘图
            service.ingest_and_save().await.context("ingestion failed")?;
            service.load_and_render().context("rendering failed")?;
        }
    }

    Ok(())
}

fn build_config(args: &ArgMatches) -> anyhow::Result<Config> {
    let mut config = Config::new();

    if let Some(tickers) = args.value_of("tickers") {
        let tickers: Vec<&str> = tickers.split(',').filter(|t| !t.trim().is_empty()).collect();
        config = config.with_tickers(&tickers);
    }
    if let Some(period) = args.value_of("period") {
        config = config.with_period(period.parse()?);
    }
    if let Some(interval) = args.value_of("interval") {
        config = config.with_interval(interval.parse()?);
    }
    if args.is_present("no-adjust") {
        config = config.with_auto_adjust(false);
    }
    if let Some(dir) = args.value_of("data-dir") {
        config = config.with_data_dir(dir);
    }
    if let Some(dir) = args.value_of("read-dir") {
        config = config.with_read_dir(dir);
    }
    if let Some(dir) = args.value_of("plot-dir") {
        config = config.with_plot_dir(dir);
    }
    if let Some(anchor) = args.value_of("anchor") {
        config = config.with_anchor_str(anchor)?;
    }
    if let Some(tz) = args.value_of("timezone") {
        config = config.with_timezone_str(tz)?;
    }

    Ok(config)
}
