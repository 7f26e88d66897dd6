use chrono::{DateTime, Utc};
use clap::Args;
use locapro::accounts::{AccountRepository, DemoProviderSeed, ServiceType};
use locapro::error::AppError;
use locapro::marketplace::Marketplace;
use locapro::requests::RequestRepository;
use serde::Serialize;

/// Budget bands offered on the request form, in whole dollars.
pub(crate) const DEMO_PRICE_RANGES: [(&str, u32, Option<u32>); 5] = [
    ("Under $50", 0, Some(50)),
    ("$50 - $100", 50, Some(100)),
    ("$100 - $250", 100, Some(250)),
    ("$250 - $500", 250, Some(500)),
    ("$500+", 500, None),
];

const CATALOGUE: [(&str, ServiceType, &str, u32, f32, u32); 10] = [
    ("Jean Claude", ServiceType::Plumbing, "Littoral", 14, 4.8, 87),
    ("Aminatou Bello", ServiceType::Electrical, "Centre", 9, 4.6, 52),
    ("Eric Mbi", ServiceType::Carpentry, "Northwest", 21, 4.9, 64),
    ("Brenda Fomum", ServiceType::Cleaning, "Southwest", 4, 4.2, 18),
    ("Samuel Njoya", ServiceType::Tutoring, "West", 11, 4.7, 33),
    ("Esther Ngassa", ServiceType::Hvac, "Littoral", 7, 4.4, 29),
    ("Pauline Talla", ServiceType::Roofing, "Adamawa", 16, 3.9, 12),
    ("Martin Ebongue", ServiceType::Landscaping, "South", 5, 4.1, 21),
    ("Chantal Mbarga", ServiceType::Painting, "East", 8, 4.5, 46),
    ("Alain Ndongo", ServiceType::Other, "Far North", 19, 3.8, 7),
];

#[derive(Args, Debug, Default)]
pub(crate) struct SeedArgs {
    /// Print the catalogue as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DemoCatalogueEntry {
    pub(crate) username: String,
    pub(crate) company_name: String,
    #[serde(flatten)]
    pub(crate) seed: DemoProviderSeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SeedSummary {
    pub(crate) providers: usize,
    pub(crate) price_ranges: usize,
}

pub(crate) fn demo_catalogue() -> Vec<DemoProviderSeed> {
    CATALOGUE
        .iter()
        .enumerate()
        .map(
            |(index, &(owner, service_type, region, years_experience, rating, total_reviews))| {
                DemoProviderSeed {
                    owner: owner.to_string(),
                    service_type,
                    region: region.to_string(),
                    years_experience,
                    rating,
                    total_reviews,
                    phone: format!("+23767{:07}", 1_000_000 + index * 37_211),
                }
            },
        )
        .collect()
}

/// Load the demo providers and, when none exist yet, the standard price ranges.
pub(crate) fn seed_marketplace<A, Q>(
    marketplace: &Marketplace<A, Q>,
    now: DateTime<Utc>,
) -> Result<SeedSummary, AppError>
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let mut providers = 0;
    for seed in demo_catalogue() {
        marketplace.accounts.seed_demo_provider(&seed, now)?;
        providers += 1;
    }

    let mut price_ranges = marketplace.requests.price_ranges()?.len();
    if price_ranges == 0 {
        for (label, min, max) in DEMO_PRICE_RANGES {
            marketplace.requests.add_price_range(label, min, max)?;
        }
        price_ranges = DEMO_PRICE_RANGES.len();
    }

    tracing::info!(providers, price_ranges, "demo data seeded");
    Ok(SeedSummary {
        providers,
        price_ranges,
    })
}

pub(crate) fn run_seed(args: SeedArgs) -> Result<(), AppError> {
    let entries: Vec<DemoCatalogueEntry> = demo_catalogue()
        .into_iter()
        .map(|seed| DemoCatalogueEntry {
            username: seed.username(),
            company_name: seed.company_name(),
            seed,
        })
        .collect();

    if args.json {
        let rendered = serde_json::to_string_pretty(&entries)
            .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Demo providers ({} total)", entries.len());
    for entry in &entries {
        println!(
            "  {:<34} {:<26} {:<12} {:<10} {:>2}y  {:.1} ({} reviews)",
            entry.username,
            entry.company_name,
            entry.seed.service_type.label(),
            entry.seed.region,
            entry.seed.years_experience,
            entry.seed.rating,
            entry.seed.total_reviews,
        );
    }
    println!();
    println!("Price ranges");
    for (label, _, _) in DEMO_PRICE_RANGES {
        println!("  {label}");
    }
    Ok(())
}
