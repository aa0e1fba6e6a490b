fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = wxrbook::cli::Args::parse();
    if let Err(e) = wxrbook::logging::init(args.log_level()) {
        eprintln!("Warning: {:#}", e);
    }
    if let Err(e) = wxrbook::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
