use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cart_sniper::browser::WebDriverLauncher;
use cart_sniper::config::Config;
use cart_sniper::fetcher::{HttpFetcher, PageLoader};
use cart_sniper::hunter::{HuntRequest, Hunter};
use cart_sniper::models::{Money, SearchResult};
use cart_sniper::parser::{PageLocators, ProductParser};
use cart_sniper::purchase::{Credentials, PurchaseOrchestrator, PurchaseRequest};
use cart_sniper::search::{self, SearchEngine};
use cart_sniper::traits::BrowserLauncher;

#[derive(Debug, Parser)]
#[command(name = "cart-sniper")]
#[command(about = "Find products on a storefront and buy them when the price is right")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search a storefront and print every product found
    Search {
        #[command(flatten)]
        query: SearchArgs,
        /// Only keep products whose name has every search term
        #[arg(long)]
        filter: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Buy one product page
    Buy {
        #[arg(long)]
        link: String,
        #[arg(long, default_value_t = 1000)]
        max: u64,
        #[command(flatten)]
        buyer: BuyerArgs,
    },
    /// Search, then buy the cheapest matching product
    Hunt {
        #[command(flatten)]
        query: SearchArgs,
        #[command(flatten)]
        buyer: BuyerArgs,
    },
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long, default_value = "www.amazon.com")]
    domain: String,
    /// Product name to search for
    #[arg(long)]
    name: String,
    #[arg(long, default_value_t = 0)]
    min: u64,
    #[arg(long, default_value_t = 10_000)]
    max: u64,
}

#[derive(Debug, Args)]
struct BuyerArgs {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    password: Option<String>,
    /// Browser profile with a signed-in session; skips the login
    #[arg(long)]
    user_data_dir: Option<PathBuf>,
    /// Go through checkout without placing the order
    #[arg(long)]
    dry_run: bool,
}

impl BuyerArgs {
    fn into_request(self, link: String, max: u64) -> PurchaseRequest {
        let credentials = match (self.email, self.password) {
            (Some(email), Some(password)) => Some(Credentials { email, password }),
            _ => None,
        };
        PurchaseRequest {
            link,
            max_price: Money::whole(max),
            credentials,
            profile_dir: self.user_data_dir,
            dry_run: self.dry_run,
        }
    }
}

struct Components {
    config: Config,
    launcher: Arc<dyn BrowserLauncher>,
    parser: ProductParser,
}

impl Components {
    fn new() -> Result<Self> {
        let config = Config::from_env().context("invalid configuration")?;
        let launcher: Arc<dyn BrowserLauncher> = Arc::new(WebDriverLauncher::new(&config));
        let parser = ProductParser::new(&PageLocators::default())?;
        Ok(Self {
            config,
            launcher,
            parser,
        })
    }

    fn loader(&self) -> Result<PageLoader> {
        let fetcher = HttpFetcher::new(&self.config)?;
        Ok(PageLoader::new(Box::new(fetcher))
            .with_browser_fallback(Arc::clone(&self.launcher), self.config.pacing.render))
    }

    fn search_engine(&self) -> Result<SearchEngine> {
        Ok(SearchEngine::new(
            self.loader()?,
            self.parser.clone(),
            self.config.cache_ttl,
        ))
    }

    fn orchestrator(&self) -> Result<PurchaseOrchestrator> {
        Ok(
            PurchaseOrchestrator::new(self.loader()?, self.parser.clone(), Arc::clone(&self.launcher))
                .with_pacing(self.config.pacing)
                .with_element_wait(self.config.element_wait),
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    let components = Components::new()?;

    match command {
        Commands::Search { query, filter, json } => {
            let mut engine = components.search_engine()?;
            let outcome = engine.search(&query.domain, &query.name, query.min, query.max).await;
            let report = settle(outcome, engine.close().await, "search engine")?;

            let mut results = report.results;
            if filter {
                results = search::filter(&query.name, results);
            }
            search::sort_by_price(&mut results);
            print_results(&results, json)?;

            if !report.errors.is_empty() {
                print_errors(&report.errors);
            }
        }
        Commands::Buy { link, max, buyer } => {
            let mut orchestrator = components.orchestrator()?;
            let request = buyer.into_request(link, max);
            let outcome = orchestrator.purchase(&request).await;
            let purchase = settle(outcome, orchestrator.close().await, "purchase browser")?;

            println!("==== RESULTS START ====");
            println!("{}", serde_json::to_string_pretty(&purchase)?);
            println!("==== RESULTS END ====");
        }
        Commands::Hunt { query, buyer } => {
            let request = HuntRequest {
                purchase: buyer.into_request(String::new(), query.max),
                domain: query.domain,
                name: query.name,
                min_price: query.min,
                max_price: query.max,
            };
            let mut hunter = Hunter::new(components.search_engine()?, components.orchestrator()?);
            let outcome = hunter.hunt(&request).await;
            let report = settle(outcome, hunter.close().await, "hunt browsers")?;

            info!("Picked {}", report.pick.url);
            println!("==== RESULTS START ====");
            println!("{}", serde_json::to_string_pretty(&report.purchase)?);
            println!("==== RESULTS END ====");
            if !report.search_errors.is_empty() {
                print_errors(&report.search_errors);
            }
        }
    }

    Ok(())
}

/// The run's own outcome wins over a failure to shut its browser down,
/// which is only logged.
fn settle<T>(outcome: cart_sniper::Result<T>, closed: cart_sniper::Result<()>, what: &str) -> cart_sniper::Result<T> {
    if let Err(e) = closed {
        warn!("Failed to close the {}: {}", what, e);
    }
    outcome
}

fn print_results(results: &[SearchResult], json: bool) -> Result<()> {
    println!("==== RESULTS START ====");
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        for result in results {
            println!("{} | {} | {}", result.product.price, result.product.name, result.url);
        }
    }
    println!("==== RESULTS END ====");
    Ok(())
}

fn print_errors(errors: &impl std::fmt::Display) {
    eprintln!("==== ERRORS START ====");
    eprintln!("{errors}");
    eprintln!("==== ERRORS END ====");
}
