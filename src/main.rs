use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use chrono::Local;
use chrono::NaiveDateTime;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::path::Path;
use std::path::PathBuf;
use usina_sheet::draft::NewOccurrence;
use usina_sheet::filter::display_label;
use usina_sheet::filter::elapsed_seconds;
use usina_sheet::filter::format_elapsed;
use usina_sheet::filter::identifier_for_label;
use usina_sheet::filter::open_counts;
use usina_sheet::filter::sort_occurrences;
use usina_sheet::filter::Facets;
use usina_sheet::filter::Filter;
use usina_sheet::filter::SortKey;
use usina_sheet::occurrence::parse_date;
use usina_sheet::occurrence::parse_time;
use usina_sheet::schema::SheetSchema;
use usina_sheet::Category;
use usina_sheet::Config;
use usina_sheet::EditSession;
use usina_sheet::Field;
use usina_sheet::Identifier;
use usina_sheet::Ledger;
use usina_sheet::Occurrence;
use usina_sheet::SheetStore;
use usina_sheet::WorkbookSession;

const DEFAULT_CONFIG: &str = "usina.toml";

#[derive(Parser)]
#[command(name = "usina", version, about = "Shutdown and equipment occurrences of generating units")]
struct Cli {
    /// TOML configuration file (defaults to ./usina.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workbook to open, overriding the configuration
    #[arg(short, long, global = true)]
    workbook: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List occurrences with the open-shutdown counts
    List(ListArgs),
    /// Print every field of one occurrence
    Show {
        /// Identifier or display label
        selection: String,
    },
    /// Edit one occurrence found by its identifier
    Edit(EditArgs),
    /// Add one occurrence per UG or asset name
    Add(AddArgs),
    /// Print the option lists of the reference sheet
    Options,
    /// Print the rows of a sheet as header: value records
    Rows {
        /// Sheet to print; lists the sheet names when omitted
        sheet: Option<String>,
    },
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    year: Vec<i32>,
    #[arg(long)]
    month: Vec<String>,
    #[arg(long)]
    day: Vec<u32>,
    #[arg(long)]
    category: Vec<Category>,
    #[arg(long)]
    client: Vec<String>,
    #[arg(long)]
    ug: Vec<String>,
    #[arg(long = "type")]
    occurrence_type: Vec<String>,
    #[arg(long)]
    asset: Vec<String>,
    #[arg(long)]
    occurrence: Vec<String>,
    /// Include normalised occurrences
    #[arg(long)]
    all: bool,
    /// shutdown, elapsed, ug or asset
    #[arg(long, default_value = "shutdown")]
    sort: SortKey,
    #[arg(long)]
    ascending: bool,
    /// Print the values available for each filter instead of the occurrences
    #[arg(long)]
    facets: bool,
}

#[derive(Args)]
struct EditArgs {
    /// Identifier or display label
    selection: String,
    /// FIELD=VALUE for a text field
    #[arg(long = "set", value_parser = parse_assignment)]
    texts: Vec<(Field, String)>,
    /// FIELD=YYYY-MM-DD (or DD/MM/YYYY) for a timestamp field
    #[arg(long = "date", value_parser = parse_assignment)]
    dates: Vec<(Field, String)>,
    /// FIELD=HH:MM[:SS] for a timestamp field
    #[arg(long = "time", value_parser = parse_assignment)]
    times: Vec<(Field, String)>,
    /// Empties a field
    #[arg(long)]
    clear: Vec<Field>,
}

#[derive(Args)]
struct AddArgs {
    #[arg(long)]
    category: Category,
    /// UG, or asset name for INVERSOR, TRACKER and STRING
    #[arg(long = "item", required = true)]
    items: Vec<String>,
    /// Plants searched for asset names
    #[arg(long = "plant")]
    plants: Vec<String>,
    #[arg(long = "type", default_value = "")]
    occurrence_type: String,
    #[arg(long, default_value = "")]
    asset: String,
    #[arg(long, default_value = "")]
    occurrence: String,
    #[arg(long, default_value = "")]
    operator: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    protocol: String,
    #[arg(long, default_value = "")]
    service_order: String,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    #[arg(long = "date", value_parser = parse_assignment)]
    dates: Vec<(Field, String)>,
    #[arg(long = "time", value_parser = parse_assignment)]
    times: Vec<(Field, String)>,
}

fn parse_assignment(text: &str) -> Result<(Field, String), String> {
    let (field, value) = text.split_once('=').ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", text))?;
    let field = field.parse::<Field>().map_err(|error| error.to_string())?;
    Ok((field, value.to_owned()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(&cli)?;
    let workbook = config.workbook()?;
    let session = WorkbookSession::open(workbook, config.header_row)
        .with_context(|| format!("Failed to open workbook '{}'", workbook.display()))?;
    let mut ledger = Ledger::new(session, &config);

    match cli.command {
        Command::List(args) => list(&mut ledger, &args),
        Command::Show { selection } => show(&mut ledger, &selection),
        Command::Edit(args) => edit(&mut ledger, &args),
        Command::Add(args) => add(&mut ledger, &args),
        Command::Options => options(&mut ledger),
        Command::Rows { sheet } => rows(&mut ledger, sheet.as_deref()),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load '{}'", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Config::load(DEFAULT_CONFIG).with_context(|| format!("Failed to load '{}'", DEFAULT_CONFIG))?
        }
        None => Config::default(),
    };
    if let Some(workbook) = &cli.workbook {
        config.workbook = Some(workbook.to_owned());
    }
    Ok(config)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn list(ledger: &mut Ledger<WorkbookSession>, args: &ListArgs) -> Result<()> {
    let filter = Filter {
        years: args.year.clone(),
        months: args.month.clone(),
        days: args.day.clone(),
        categories: args.category.clone(),
        clients: args.client.clone(),
        ugs: args.ug.clone(),
        occurrence_types: args.occurrence_type.clone(),
        assets: args.asset.clone(),
        occurrences: args.occurrence.clone(),
    };
    let collisions = ledger.collisions().context("Failed to load occurrences")?;
    let occurrences = ledger.occurrences().context("Failed to load occurrences")?;
    if args.facets {
        print_facets(&Facets::collect(&filter.apply(occurrences).into_iter().cloned().collect::<Vec<_>>()));
        return Ok(());
    }
    let counts = open_counts(occurrences, &filter);
    println!("Open shutdowns: {} (total {})", counts.filtered, counts.total);

    let now = now();
    let mut selected: Vec<&Occurrence> = filter
        .apply(occurrences)
        .into_iter()
        .filter(|occurrence| args.all || occurrence.is_open())
        .collect();
    sort_occurrences(&mut selected, args.sort, !args.ascending, now);
    for occurrence in selected {
        let elapsed = elapsed_seconds(occurrence, now).map(format_elapsed).unwrap_or_default();
        let status = if occurrence.is_open() { "open" } else { "normalised" };
        println!("{}  [{}, {}]", display_label(occurrence), status, elapsed);
        println!("    {}", Identifier::of(occurrence));
    }
    for (identifier, count) in collisions {
        eprintln!("warning: {} occurrences share '{}'; edits apply to the first one", count, identifier);
    }
    Ok(())
}

/// Accepts either a composite identifier or the label printed by `list`.
fn select(ledger: &mut Ledger<WorkbookSession>, selection: &str) -> Result<Identifier> {
    let occurrences = ledger.occurrences().context("Failed to load occurrences")?;
    let candidates: Vec<&Occurrence> = occurrences.iter().collect();
    Ok(identifier_for_label(&candidates, selection.trim()).unwrap_or_else(|| Identifier::from(selection)))
}

fn print_facets(facets: &Facets) {
    let join = |values: Vec<String>| values.join(", ");
    println!("Years: {}", join(facets.years.iter().map(i32::to_string).collect()));
    println!("Months: {}", facets.months.join(", "));
    println!("Days: {}", join(facets.days.iter().map(u32::to_string).collect()));
    println!("Categories: {}", join(facets.categories.iter().map(Category::to_string).collect()));
    println!("Clients: {}", facets.clients.join(", "));
    println!("UGs: {}", facets.ugs.join(", "));
    println!("Occurrence types: {}", facets.occurrence_types.join(", "));
    println!("Assets: {}", facets.assets.join(", "));
    println!("Occurrences: {}", facets.occurrences.join(", "));
}

fn show(ledger: &mut Ledger<WorkbookSession>, selection: &str) -> Result<()> {
    let identifier = select(ledger, selection)?;
    let occurrence = ledger.find(&identifier)?;
    let schema = SheetSchema::for_category(occurrence.category);
    println!("{} row {}", occurrence.category, occurrence.row_number);
    for field in schema.fields() {
        println!("{:>30}: {}", field.label(), occurrence.text(*field));
    }
    if let Some(elapsed) = elapsed_seconds(&occurrence, now()) {
        println!("{:>30}: {}", "Elapsed", format_elapsed(elapsed));
    }
    if Identifier::of(&occurrence).has_missing_timestamp() {
        println!("{:>30}: {}", "Note", "no valid shutdown time, edits match it through NaT");
    }
    Ok(())
}

fn edit(ledger: &mut Ledger<WorkbookSession>, args: &EditArgs) -> Result<()> {
    let identifier = select(ledger, &args.selection)?;
    let current = ledger.find(&identifier)?;
    let mut session = EditSession::new(identifier);
    for (field, value) in &args.texts {
        session.set_text(*field, value.to_owned())?;
    }
    // Untouched halves keep the stored value
    let mut seeded = Vec::new();
    for (field, _) in args.dates.iter().chain(&args.times) {
        if !seeded.contains(field) {
            session.set_timestamp(*field, current.timestamp(*field))?;
            seeded.push(*field);
        }
    }
    for (field, value) in &args.dates {
        session.set_date(*field, Some(parse_date(value)?))?;
    }
    for (field, value) in &args.times {
        session.set_time(*field, Some(parse_time(value)?))?;
    }
    for field in &args.clear {
        if field.is_timestamp() {
            session.set_timestamp(*field, None)?;
        } else {
            session.set_text(*field, "")?;
        }
    }
    if session.is_empty() {
        bail!("Nothing to change; use --set, --date, --time or --clear");
    }

    let written = ledger
        .commit_edit(&mut session)
        .with_context(|| format!("Edit of '{}' failed", session.identifier()))?;
    println!("Updated {} row {}", written.category, written.row_number);
    println!("    {}", Identifier::of(&written));
    Ok(())
}

fn add(ledger: &mut Ledger<WorkbookSession>, args: &AddArgs) -> Result<()> {
    let mut draft = NewOccurrence::new(args.category);
    draft.items = args.items.clone();
    draft.plants = args.plants.clone();
    draft.occurrence_type = args.occurrence_type.clone();
    draft.asset = args.asset.clone();
    draft.occurrence = args.occurrence.clone();
    draft.operator = args.operator.clone();
    draft.description = args.description.clone();
    draft.protocol = args.protocol.clone();
    draft.service_order = args.service_order.clone();
    draft.quantity = args.quantity;
    for (field, value) in &args.dates {
        if !field.is_timestamp() {
            bail!("'{}' is not a timestamp field", field);
        }
        draft.timestamps.entry(*field).or_default().date = Some(parse_date(value)?);
    }
    for (field, value) in &args.times {
        if !field.is_timestamp() {
            bail!("'{}' is not a timestamp field", field);
        }
        draft.timestamps.entry(*field).or_default().time = Some(parse_time(value)?);
    }

    let added = ledger.append(&draft).context("Failed to add occurrences")?;
    for occurrence in &added {
        println!("Added {} row {}", occurrence.category, occurrence.row_number);
        println!("    {}", Identifier::of(occurrence));
    }
    Ok(())
}

fn options(ledger: &mut Ledger<WorkbookSession>) -> Result<()> {
    let reference = ledger.reference_data()?;
    let lists = reference.option_lists();
    for client in &lists.clients {
        println!("{}: {}", client, reference.ugs_for_client(client).join(", "));
    }
    let sections = [
        ("Occurrence types", &lists.occurrence_types),
        ("Occurrences", &lists.occurrences),
        ("Assets", &lists.assets),
        ("Operators", &lists.operators),
    ];
    for (title, values) in sections {
        println!();
        println!("{}:", title);
        for value in values {
            println!("  {}", value);
        }
    }
    Ok(())
}

fn rows(ledger: &mut Ledger<WorkbookSession>, sheet: Option<&str>) -> Result<()> {
    let sheet_names = ledger.store().sheet_names();
    let sheet = match sheet {
        Some(sheet) => sheet,
        None => {
            for name in &sheet_names {
                println!("{}", name);
            }
            return Ok(());
        }
    };
    if !sheet_names.iter().any(|name| name == sheet) {
        bail!("No sheet '{}' in the workbook ({})", sheet, sheet_names.join(", "));
    }
    let table = ledger
        .store_mut()
        .read_all_rows(sheet)
        .with_context(|| format!("Failed to read '{}'", sheet))?;
    for (row, record) in table.rows.iter().zip(table.records()) {
        println!("row {}", row.number);
        for (header, value) in record.into_iter().filter(|(_, value)| !value.is_empty()) {
            println!("{:>30}: {}", header, value);
        }
    }
    Ok(())
}
