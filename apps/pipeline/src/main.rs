use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use migration::{Migrator, MigratorTrait};
use platform_db::{SeaDealRepository, connect, load_companies, load_contacts, seed_pipeline_demo};
use platform_obs::init_tracing;
use products_crm::{
    Deal, DealFilter, DealForm, DealId, DealQuery, DealRepository, DealsView, DirectoryDelivery,
    DragEvent, DragOutcome, Level, NotificationLog, SortDirection, SortKey, Stage, SubmitError,
};
use tracing::info;

mod config;
mod render;

use config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "pipeline", version, about = "Deal pipeline: board, list, move, export")]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[arg(value_enum, default_value_t = MigrationDirection::Up)]
        direction: MigrationDirection,
    },
    /// Insert demo companies, contacts and deals
    Seed,
    /// Show the five stage buckets
    Board(FilterArgs),
    /// List deals in display order
    List {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "createdAt")]
        sort: SortKey,
        #[arg(long, default_value = "desc")]
        order: SortDirection,
    },
    /// Move a deal between buckets; omit the destination to drop outside the board
    Move {
        id: DealId,
        /// Bucket the deal is dragged from; must be its current stage
        from: Stage,
        to: Option<Stage>,
    },
    /// Create a deal
    Create(DealArgs),
    /// Edit a deal; unset options keep their current value
    Edit {
        id: DealId,
        #[command(flatten)]
        changes: EditArgs,
    },
    /// Delete a deal
    Delete {
        id: DealId,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Write the filtered deals to a CSV file
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        /// Overrides EXPORT_DIR
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Pipeline totals across all deals
    Stats,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MigrationDirection {
    Up,
    Down,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Case-insensitive search over deal names and notes
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    stage: Option<Stage>,
    /// Company id
    #[arg(long)]
    company: Option<String>,
    /// Created on or after (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Created on or before (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl FilterArgs {
    fn into_filter(self) -> DealFilter {
        let mut filter = DealFilter::default().with_created_range(self.from, self.to);
        if let Some(query) = self.query {
            filter = filter.with_query(query);
        }
        if let Some(stage) = self.stage {
            filter = filter.with_stage(stage);
        }
        if let Some(company) = self.company {
            filter = filter.with_company(company);
        }
        filter
    }
}

#[derive(Args, Debug)]
struct DealArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    value: String,
    #[arg(long, default_value = "Prospecting")]
    stage: Stage,
    /// YYYY-MM-DD, today or later
    #[arg(long)]
    close_date: String,
    #[arg(long)]
    contact: String,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

impl DealArgs {
    fn into_form(self) -> DealForm {
        DealForm {
            name: self.name,
            value: self.value,
            stage: self.stage.as_str().to_string(),
            expected_close_date: self.close_date,
            contact_id: self.contact,
            company_id: self.company.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
        }
    }
}

#[derive(Args, Debug)]
struct EditArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    value: Option<String>,
    #[arg(long)]
    stage: Option<Stage>,
    #[arg(long)]
    close_date: Option<String>,
    #[arg(long)]
    contact: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

impl EditArgs {
    fn apply(self, form: &mut DealForm) {
        let EditArgs {
            name,
            value,
            stage,
            close_date,
            contact,
            company,
            notes,
        } = self;
        if let Some(name) = name {
            form.name = name;
        }
        if let Some(value) = value {
            form.value = value;
        }
        if let Some(stage) = stage {
            form.stage = stage.as_str().to_string();
        }
        if let Some(close_date) = close_date {
            form.expected_close_date = close_date;
        }
        if let Some(contact) = contact {
            form.contact_id = contact;
        }
        if let Some(company) = company {
            form.company_id = company;
        }
        if let Some(notes) = notes {
            form.notes = notes;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(url) = cli.database_url.clone() {
        config.database_url = url;
    }
    init_tracing(config.obs())?;

    let db = connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;

    match cli.command {
        Commands::Migrate { direction } => {
            match direction {
                MigrationDirection::Up => Migrator::up(&db, None).await?,
                MigrationDirection::Down => Migrator::down(&db, None).await?,
            }
            info!(?direction, "migrations applied");
            Ok(())
        }
        Commands::Seed => {
            Migrator::up(&db, None).await?;
            let report = seed_pipeline_demo(&db).await?;
            if report.is_empty() {
                println!("Deals already present, nothing seeded");
            } else {
                println!(
                    "Seeded {} companies, {} contacts, {} deals",
                    report.companies, report.contacts, report.deals
                );
            }
            Ok(())
        }
        command => {
            Migrator::up(&db, None).await?;
            let repo = SeaDealRepository::new(db);
            run(command, &repo, &config).await
        }
    }
}

async fn run(command: Commands, repo: &SeaDealRepository, config: &AppConfig) -> Result<()> {
    let notes = NotificationLog::new();
    let mut view = DealsView::new(repo, &notes);
    let contacts = load_contacts(repo.connection()).await?;
    let companies = load_companies(repo.connection()).await?;
    let loaded = view.load(contacts, companies).await;
    flush(&notes);
    loaded?;

    let result = dispatch(command, &mut view, config).await;
    flush(&notes);
    result
}

async fn dispatch(
    command: Commands,
    view: &mut DealsView<&SeaDealRepository, &NotificationLog>,
    config: &AppConfig,
) -> Result<()> {
    match command {
        Commands::Board(filters) => {
            view.set_filter(filters.into_filter());
            let board = view.board();
            print!("{}", render::board(&board, view.contacts(), view.companies()));
        }
        Commands::List {
            filters,
            sort,
            order,
        } => {
            view.set_query(DealQuery {
                filter: filters.into_filter(),
                sort_key: sort,
                direction: order,
            });
            let visible = view.visible().to_vec();
            for deal in &visible {
                println!(
                    "{}",
                    render::deal_line(deal, view.contacts(), view.companies())
                );
            }
        }
        Commands::Move { id, from, to } => {
            let event = drag_from_current_bucket(view.deals(), id, from, to)?;
            let source = event.source;
            match view.handle_drag(event).await? {
                DragOutcome::NoOp => println!("Deal #{id} stays in {source}"),
                DragOutcome::Moved(_) => {}
            }
        }
        Commands::Create(args) => {
            submit(view, args.into_form(), None).await?;
        }
        Commands::Edit { id, changes } => {
            let existing = view.repository().get_by_id(id).await?;
            let mut form = DealForm::for_edit(&existing, view.companies());
            changes.apply(&mut form);
            submit(view, form, Some(id)).await?;
        }
        Commands::Delete { id, yes } => {
            let Some(deal) = view.request_delete(id) else {
                bail!("deal {id} not found");
            };
            let name = deal.name.clone();
            if !yes {
                view.cancel_delete();
                println!("Delete \"{name}\"? Re-run with --yes to confirm");
                return Ok(());
            }
            if !view.confirm_delete().await? {
                bail!("deal {id} was not deleted");
            }
        }
        Commands::Export { filters, dir } => {
            view.set_filter(filters.into_filter());
            let delivery = DirectoryDelivery::new(dir.unwrap_or_else(|| config.export_dir.clone()));
            let file = view.export(&delivery).await?;
            println!("{}", delivery.target_for(&file).display());
        }
        Commands::Stats => {
            print!("{}", render::stats(&view.stats()));
        }
        Commands::Migrate { .. } | Commands::Seed => {
            return Err(anyhow!("handled before the view is built"));
        }
    }
    Ok(())
}

/// The drag starts from the bucket the deal sits in; a `from` that disagrees
/// with the stored stage is rejected.
fn drag_from_current_bucket(
    deals: &[Deal],
    id: DealId,
    from: Stage,
    to: Option<Stage>,
) -> Result<DragEvent> {
    let Some(deal) = deals.iter().find(|deal| deal.id == id) else {
        bail!("deal {id} not found");
    };
    if deal.stage != from {
        bail!("deal #{id} is in {}, not {from}", deal.stage);
    }
    Ok(DragEvent {
        source: deal.stage,
        destination: to,
        deal_id: id,
    })
}

async fn submit(
    view: &mut DealsView<&SeaDealRepository, &NotificationLog>,
    form: DealForm,
    editing: Option<DealId>,
) -> Result<()> {
    match view.submit(&form, editing).await {
        Ok(deal) => {
            println!("#{} {}", deal.id, deal.name);
            Ok(())
        }
        Err(SubmitError::Invalid(errors)) => {
            for (field, message) in errors.iter() {
                eprintln!("  {}: {}", field.as_str(), message);
            }
            Err(errors.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn flush(notes: &NotificationLog) {
    for note in notes.drain() {
        match note.level {
            Level::Success => println!("{}", note.message),
            Level::Error => eprintln!("{}", note.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use products_crm::CompanyRef;

    fn prospect(id: DealId) -> Deal {
        let now = Utc::now();
        Deal {
            id,
            name: "Referral consulting".into(),
            value: 4000.0,
            stage: Stage::Prospecting,
            expected_close_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            contact_id: Some(1),
            company_id: CompanyRef::Unresolved,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn move_source_is_the_current_stage() {
        let deals = vec![prospect(6)];
        let event =
            drag_from_current_bucket(&deals, 6, Stage::Prospecting, Some(Stage::Proposal)).unwrap();
        assert_eq!(event.source, Stage::Prospecting);
        assert_eq!(event.destination, Some(Stage::Proposal));
    }

    #[test]
    fn move_rejects_a_mismatched_source() {
        let deals = vec![prospect(6)];
        let err = drag_from_current_bucket(&deals, 6, Stage::Proposal, Some(Stage::Proposal))
            .unwrap_err();
        assert_eq!(err.to_string(), "deal #6 is in Prospecting, not Proposal");
        let err = drag_from_current_bucket(&deals, 6, Stage::Negotiation, Some(Stage::Prospecting))
            .unwrap_err();
        assert!(err.to_string().contains("is in Prospecting"));
    }

    #[test]
    fn move_of_unknown_deal_fails() {
        let err = drag_from_current_bucket(&[], 9, Stage::Prospecting, None).unwrap_err();
        assert_eq!(err.to_string(), "deal 9 not found");
    }
}
