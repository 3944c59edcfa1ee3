mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        cli::print_usage();
        return Ok(());
    }

    let options = cli::DemoOptions::parse(&args)?;
    if options.play {
        cli::run_live(&options)
    } else {
        cli::run_offline(&options)
    }
}
