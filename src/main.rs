use std::io::{BufReader, Read};

use clap::Parser;
use event_search::{
    DataDir,
    SearchService,
    Settings,
    error,
    search::{self, SearchRequest},
    text_query::event_text_query,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, PageArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("EVENT_SEARCH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let settings = Settings::load(&data_dir.settings_file())?;
    let service = SearchService::open(&data_dir, settings)?;

    match cli.command {
        Command::Index(args) => {
            let count = if args.reads_stdin() {
                service.import(std::io::stdin().lock())?
            } else {
                let file = std::fs::File::open(&args.input)?;
                service.import(BufReader::new(file))?
            };
            println!("Indexed {count} event(s)");
        }
        Command::Delete { identity } => {
            service.delete(identity)?;
            println!("Deleted event {identity}");
        }
        Command::Search(args) => {
            let query =
                event_text_query(&args.text, &service.settings().text_query)?;
            run_page(&service, SearchRequest::new(query), &args.page)?;
        }
        Command::Query(args) => {
            let query = serde_json::from_str(&args.query)?;
            run_page(&service, service.request(&query)?, &args.page)?;
        }
        Command::Request(args) => {
            let raw = if args.request == "-" {
                let mut raw = String::new();
                std::io::stdin().read_to_string(&mut raw)?;
                raw
            } else {
                args.request
            };
            let request = SearchRequest::from_json(
                &serde_json::from_str(&raw)?,
                &service.compiler(),
            )?;
            print_results(&service, &request, args.json)?;
        }
        Command::Status(args) => {
            let status = service.status()?;
            if args.json {
                println!("{}", serde_json::to_string(&status)?);
            } else {
                println!("Data directory: {}", data_dir.root().display());
                println!("Events:  {}", status.events);
                println!("Records: {}", status.records);
            }
        }
        Command::Completions(args) => args.generate(),
    }

    service.close()
}

fn run_page(
    service: &SearchService,
    mut request: SearchRequest,
    page: &PageArgs,
) -> error::Result<()> {
    request.start_index = page.start;
    request.limit = page.limit;
    request.scoring = !page.no_scoring;
    request.include_payload = page.payload;
    print_results(service, &request, page.json)
}

fn print_results(
    service: &SearchService,
    request: &SearchRequest,
    json: bool,
) -> error::Result<()> {
    let results = service.execute(request)?;
    if json {
        search::format_json(&results)?;
    } else {
        search::format_human(&results);
    }
    Ok(())
}
