use std::path::Path;

use anyhow::{Context as _, Result, bail};
use migrun_config::{AppConfig, ConfigLoader};
use migrun_core::{Migration, MigrationLocator, MigrationParser};
use migrun_db::{MigrationReport, Outcome, Runner, VersionStore};
use tracing::debug;

use crate::cli::{CreateArgs, DownArgs, GlobalArgs, ShowArgs, StatusArgs, UpArgs};

/// Loaded configuration plus the parser built from it.
pub struct Context {
    pub config: AppConfig,
    pub parser: MigrationParser,
}

impl Context {
    pub fn load(global: &GlobalArgs, cwd: &Path) -> Result<Self> {
        let config = ConfigLoader::load_or_default(global.config.as_deref(), cwd)
            .context("failed to load configuration")?;
        let locator = MigrationLocator::new(
            &config.migrations.directory,
            &config.migrations.extension,
        );
        debug!(
            "migrations in {} (*.{})",
            locator.directory().display(),
            locator.extension()
        );
        Ok(Self {
            parser: MigrationParser::new(locator),
            config,
        })
    }

    pub fn open_store(&self) -> Result<VersionStore> {
        let db = &self.config.database;
        if db.driver != "sqlite" {
            bail!(
                "database driver '{}' is not supported (dsn {}); only sqlite is available",
                db.driver,
                db.dsn()
            );
        }
        let path = db
            .path
            .as_deref()
            .context("database.path must be set for the sqlite driver")?;
        Ok(VersionStore::open(path, &self.config.migrations.version_table)?)
    }

    fn load_all(&self) -> Result<Vec<Migration>> {
        self.parser
            .load_all()
            .context("failed to load migration files")
    }
}

pub fn status(ctx: &Context, args: &StatusArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let runner = Runner::new(&store);
    let mut migrations = ctx.load_all()?;
    let lines = runner.status(&mut migrations)?;
    let orphans = runner.orphans(&migrations)?;

    if args.json {
        let out = serde_json::json!({ "migrations": lines, "orphans": orphans });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if lines.is_empty() {
        println!("No migrations in {}", ctx.parser.locator().directory().display());
    }
    for line in &lines {
        let state = match (line.executed, line.skip) {
            (true, _) => "applied",
            (false, true) => "skip",
            (false, false) => "pending",
        };
        let applied_at = line
            .applied_at
            .map(|at| format!("  (applied {})", at.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default();
        println!(
            "  [{state:>7}]  {}  {}  {}{applied_at}",
            line.migration_id, line.date, line.name
        );
    }
    for id in &orphans {
        println!("  [ orphan]  {id}  (no migration file)");
    }

    let pending = lines.iter().filter(|l| !l.executed).count();
    println!();
    println!(
        "{} migrations, {pending} pending, {} recorded in {}",
        lines.len(),
        store.applied_count()?,
        store.table()
    );
    Ok(())
}

pub fn up(ctx: &Context, args: &UpArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let mut migrations = ctx.load_all()?;
    let reports = Runner::new(&store).migrate(&mut migrations, args.count)?;
    print_reports(&reports, "Nothing to migrate.");
    Ok(())
}

pub fn down(ctx: &Context, args: &DownArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let mut migrations = ctx.load_all()?;
    let reports = Runner::new(&store).rollback_last(&mut migrations, args.count)?;
    print_reports(&reports, "Nothing to roll back.");
    Ok(())
}

pub fn show(ctx: &Context, args: &ShowArgs) -> Result<()> {
    let migration = ctx
        .parser
        .load(&args.migration_id)
        .with_context(|| format!("failed to load {}", args.migration_id))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&migration)?);
        return Ok(());
    }

    println!("Migration:   {}", migration.migration_id());
    println!("Name:        {}", migration.name());
    println!("Label:       {}", migration.clear_name());
    println!("Date:        {}", migration.date());
    println!("Description: {}", migration.description());
    println!("Skip:        {}", if migration.is_skip() { "yes" } else { "no" });
    print_statements("UP", migration.up_sql());
    print_statements("DOWN", migration.down_sql());
    Ok(())
}

pub fn create(ctx: &Context, args: &CreateArgs) -> Result<()> {
    let now = chrono::Local::now().naive_local();
    let description = match &args.description {
        Some(text) => text.clone(),
        None => ctx
            .config
            .migrations
            .expand_description(&current_user(), now),
    };

    let id = ctx
        .parser
        .locator()
        .create(&args.label, &description, now)
        .context("failed to create migration file")?;
    println!("Created {}", ctx.parser.locator().path_for(&id).display());
    Ok(())
}

fn print_reports(reports: &[MigrationReport], empty: &str) {
    if reports.is_empty() {
        println!("{empty}");
        return;
    }
    for report in reports {
        let detail = match report.outcome {
            Outcome::Applied { statements } => format!("applied, {statements} statements"),
            Outcome::Reverted { statements } => format!("reverted, {statements} statements"),
            Outcome::Skipped => "skipped".to_string(),
        };
        println!("  {}  {detail}", report.migration_id);
    }
}

fn print_statements(section: &str, statements: &[String]) {
    println!();
    println!("-- {section} -- ({} statements)", statements.len());
    for (index, sql) in statements.iter().enumerate() {
        println!("[{}]", index + 1);
        println!("{sql}");
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
