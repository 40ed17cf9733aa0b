use crate::{emit_failure, emit_success, OutputMode};
use anyhow::Context as _;
use confgraph::config::{self, ConfgraphConfig};
use confgraph::consolidate::{self, Consolidator, WrittenDatabase};
use confgraph::storage::{Database, SearchPath};
use confgraph::ui::{self, Icons, Spinner, TableBuilder};
use confgraph::{Error, FileKind, ObjectId};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct Context {
    pub config: ConfgraphConfig,
    pub output_mode: OutputMode,
}

impl Context {
    fn open(&self, paths: &[PathBuf]) -> anyhow::Result<Database> {
        let spinner = self
            .output_mode
            .is_human()
            .then(|| Spinner::new("Loading database..."));
        let started = Instant::now();

        let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let db = Database::open_many(paths, SearchPath::from_config(&self.config))
            .with_context(|| format!("failed to open {}", names.join(", ")))?;

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
            ui::timing(&format!(
                "Loaded {} files, {} objects in {}",
                db.includes().len(),
                db.store().len(),
                ui::elapsed(started.elapsed())
            ));
        }
        Ok(db)
    }
}

fn parse_ids(raw: &[String]) -> anyhow::Result<Vec<ObjectId>> {
    raw.iter()
        .map(|s| ObjectId::parse(s).map_err(Into::into))
        .collect()
}

fn file_keys(db: &Database, paths: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    paths.iter().map(|p| db.file_key(p).map_err(Into::into)).collect()
}

fn report_written(ctx: &Context, command: &str, written: &WrittenDatabase) -> anyhow::Result<()> {
    if ctx.output_mode.is_human() {
        ui::file_new(&written.path.display().to_string());
        ui::summary_row("Objects:", &written.objects.len().to_string());
        for include in &written.includes {
            ui::summary_row("Includes:", include);
        }
        ui::summary_row("Digest:", &ui::muted(&written.digest));
    } else {
        emit_success(ctx.output_mode, command, serde_json::to_value(written)?)?;
    }
    Ok(())
}

pub fn run_includes(ctx: &Context, file: &Path, direct: bool) -> anyhow::Result<()> {
    let db = ctx.open(&[file.to_path_buf()])?;
    let key = db.file_key(file)?;
    let includes = db.includes();

    let files: Vec<String> = if direct {
        includes.direct_includes(&key)?.into_iter().map(str::to_string).collect()
    } else {
        includes.includes_only(&key)?.into_iter().collect()
    };

    if ctx.output_mode.is_human() {
        ui::section(&format!("Includes of {}", key));
        if files.is_empty() {
            println!("  {}", ui::dim("(none)"));
        }
        for f in &files {
            let icon = match includes.kind(f) {
                Some(FileKind::Schema) => Icons::SCHEMA,
                _ => Icons::FILE,
            };
            println!("  {} {}", icon, f);
        }
    } else {
        let entries: Vec<_> = files
            .iter()
            .map(|f| serde_json::json!({"path": f, "kind": includes.kind(f)}))
            .collect();
        emit_success(
            ctx.output_mode,
            "includes",
            serde_json::json!({"file": key, "direct": direct, "includes": entries}),
        )?;
    }
    Ok(())
}

pub fn run_closure(ctx: &Context, file: &Path, roots: &[String]) -> anyhow::Result<()> {
    let roots = parse_ids(roots)?;
    let db = ctx.open(&[file.to_path_buf()])?;
    let closure = db.closure().closure(&roots)?;

    if ctx.output_mode.is_human() {
        ui::section(&format!("{} objects reachable", closure.len()));
        for id in &closure {
            ui::object_line(&id.id, &id.class);
        }
        ui::summary_row("Classes:", &closure.classes().into_iter().collect::<Vec<_>>().join(", "));
    } else {
        let objects: Vec<String> = closure.iter().map(ObjectId::to_key_string).collect();
        emit_success(
            ctx.output_mode,
            "closure",
            serde_json::json!({"roots": roots, "objects": objects}),
        )?;
    }
    Ok(())
}

pub fn run_extract(
    ctx: &Context,
    file: &Path,
    roots: &[String],
    data_roots: &[PathBuf],
    schema_roots: &[PathBuf],
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let roots = parse_ids(roots)?;
    if roots.is_empty() && data_roots.is_empty() {
        anyhow::bail!("nothing to extract: give at least one --root or --data-root");
    }

    let mut paths = vec![file.to_path_buf()];
    paths.extend(data_roots.iter().cloned());
    paths.extend(schema_roots.iter().cloned());
    let db = ctx.open(&paths)?;

    let mut root_files = file_keys(&db, data_roots)?;
    root_files.extend(file_keys(&db, schema_roots)?);

    let output = match output {
        Some(path) => path,
        None => {
            let dir = ctx
                .config
                .output_dir
                .clone()
                .or_else(|| file.parent().map(Path::to_path_buf))
                .unwrap_or_default();
            config::ensure_output_dir(&dir)?;
            let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            consolidate::timestamped_output(&dir.join(format!("{}.json", stem)))
        }
    };

    let written = Consolidator::new(&db).consolidate(&root_files, &roots, &output)?;
    report_written(ctx, "extract", &written)
}

pub fn run_flatten(ctx: &Context, file: &Path, output: &Path) -> anyhow::Result<()> {
    let db = ctx.open(&[file.to_path_buf()])?;
    let key = db.file_key(file)?;
    let written = Consolidator::new(&db).flatten(&key, output)?;
    report_written(ctx, "flatten", &written)
}

pub fn run_merge(ctx: &Context, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
    let db = ctx.open(inputs)?;
    let keys = file_keys(&db, inputs)?;
    let written = Consolidator::new(&db).merge(&keys, output)?;
    report_written(ctx, "merge", &written)
}

pub fn run_copy(ctx: &Context, inputs: &[PathBuf], dest: &Path) -> anyhow::Result<()> {
    let db = ctx.open(inputs)?;
    let keys = file_keys(&db, inputs)?;
    let written = Consolidator::new(&db).copy_configuration(dest, &keys)?;

    if ctx.output_mode.is_human() {
        ui::section(&format!("Copied {} files into {}", written.len(), dest.display()));
        for w in &written {
            ui::file_new(&w.path.display().to_string());
        }
    } else {
        emit_success(ctx.output_mode, "copy", serde_json::to_value(&written)?)?;
    }
    Ok(())
}

pub fn run_validate(ctx: &Context, file: &Path, object: Option<&str>) -> anyhow::Result<()> {
    let mut db = ctx.open(&[file.to_path_buf()])?;
    let target = object.map(ObjectId::parse).transpose()?;

    let mutator = db.mutator();
    let result = match &target {
        Some(id) => mutator.validate(id),
        None => mutator.validate_all(),
    };

    match result {
        Ok(()) => {
            if ctx.output_mode.is_human() {
                ui::success("No not-null violations");
            } else {
                emit_success(ctx.output_mode, "validate", serde_json::json!({"violations": []}))?;
            }
            Ok(())
        }
        Err(Error::NotNullViolations(violations)) => {
            if ctx.output_mode.is_human() {
                ui::section(&format!("{} not-null violation(s)", violations.len()));
                for v in &violations {
                    println!(
                        "  {} {}.{}",
                        Icons::CROSS,
                        v.object,
                        v.relationship.style(ui::theme().warn.clone())
                    );
                }
            }
            let message = format!("validation failed with {} violation(s)", violations.len());
            emit_failure(
                ctx.output_mode,
                "validate",
                &message,
                serde_json::json!({"violations": violations}),
            )?;
            anyhow::bail!(message)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn run_toggle(
    ctx: &Context,
    file: &Path,
    session: &str,
    resource: &str,
    relationship: Option<&str>,
    enabled: bool,
) -> anyhow::Result<()> {
    let session = ObjectId::parse(session)?;
    let resource = ObjectId::parse(resource)?;
    let relationship = relationship.unwrap_or(ctx.config.disabled_relationship());
    let verb = if enabled { "enabled" } else { "disabled" };

    let mut db = ctx.open(&[file.to_path_buf()])?;
    let changed = db
        .mutator()
        .set_enabled(&session, relationship, &resource, enabled)?;

    let mut saved = None;
    if changed {
        let origin = db
            .store()
            .origin(&session)
            .map(str::to_string)
            .with_context(|| format!("{} was not loaded from a file", session))?;
        db.save(&origin)?;
        saved = Some(origin);
    }

    if ctx.output_mode.is_human() {
        let icon = if enabled { Icons::ENABLED } else { Icons::DISABLED };
        match &saved {
            Some(path) => {
                ui::status(icon, &format!("{} {} in {}", verb, resource, session), path);
            }
            None => ui::warn(&format!("{} is already {} in {}", resource, verb, session)),
        }
    } else {
        emit_success(
            ctx.output_mode,
            if enabled { "enable" } else { "disable" },
            serde_json::json!({
                "session": session,
                "resource": resource,
                "changed": changed,
                "saved": saved,
            }),
        )?;
    }
    Ok(())
}

pub fn run_stats(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let db = ctx.open(&[file.to_path_buf()])?;
    let stats = db.stats();

    if ctx.output_mode.is_human() {
        println!("{} Confgraph Statistics ({})", Icons::STATS, file.display());
        let mut table = TableBuilder::new();
        table.add_row("Schema files", stats.schema_files);
        table.add_row("Data files", stats.data_files);
        table.add_row("Classes", stats.classes);
        table.add_row("Objects", stats.objects);
        table.add_row("References", stats.references);
        println!("{}", table.build());
    } else {
        emit_success(ctx.output_mode, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}

pub fn run_init(output_mode: OutputMode, path: &Path, force: bool) -> anyhow::Result<()> {
    let defaults = ConfgraphConfig {
        search_path: Vec::new(),
        output_dir: Some(PathBuf::from("extracted")),
        disabled_relationship: Some(config::DEFAULT_DISABLED_RELATIONSHIP.to_string()),
    };
    config::write_config(path, &defaults, force)?;

    if output_mode.is_human() {
        ui::header("Confgraph initialized");
        ui::info("Config", &path.display().to_string());
        ui::status(Icons::DATABASE, "Output directory", "extracted");
    } else {
        emit_success(output_mode, "init", serde_json::json!({"config": path}))?;
    }
    Ok(())
}
