use anyhow::{Context, Result};
use clap::Parser;
use entity_finder::cli::{Cli, Commands, DumpFormat, OutputFormat, ScanArgs};
use entity_finder::config::{
    decoration, property_names, resolve_build_dir, resolve_locations, scan_options,
    tracked_annotations,
};
use entity_finder::db::AnnotationDb;
use entity_finder::logging::init_logging;
use entity_finder::output::initialize_output_file;
use entity_finder::properties::{group_by_property, render_values, write_json, write_properties};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{debug, info, warn};

const HEADER: &str = "Generated by entity-finder";

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.clone() {
        Commands::List {
            scan,
            annotations,
            default_property,
            properties,
            first_item_prefix,
            prefix,
            suffix,
            last_item_suffix,
            keep_quotes,
            format,
            output,
            stdout,
        } => {
            let output_file = if stdout {
                None
            } else {
                let build_dir = resolve_build_dir(&cli)?;
                Some(initialize_output_file(output.as_deref(), &build_dir)?)
            };

            let db = scan_classpath(&scan)?;
            let index = db.annotation_index();
            if index.is_empty() {
                warn!("After scanning for entities, no annotated entities were found");
            }

            let names = property_names(default_property.as_deref(), &properties);
            let groups = group_by_property(index, &tracked_annotations(&annotations), &names);
            let decoration = decoration(
                &first_item_prefix,
                &prefix,
                &suffix,
                &last_item_suffix,
                keep_quotes,
            );
            let values = render_values(&groups, &decoration);
            for (key, value) in &values {
                debug!("{key} = {value}");
            }

            match output_file {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let mut writer = BufWriter::new(file);
                    write_output(&mut writer, format, &values)
                        .and_then(|()| writer.flush())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Wrote {} propert(ies) to {}", values.len(), path.display());
                }
                None => {
                    let mut out = io::stdout().lock();
                    write_output(&mut out, format, &values)?;
                }
            }
        }
        Commands::Dump {
            scan,
            types,
            format,
        } => {
            let db = scan_classpath(&scan)?;
            let mut out = io::stdout().lock();
            match format {
                DumpFormat::Json => db.write_json_report(&mut out)?,
                DumpFormat::Text => {
                    db.write_annotation_index(&mut out)?;
                    if types {
                        db.write_type_index(&mut out)?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn scan_classpath(args: &ScanArgs) -> Result<AnnotationDb> {
    let mut db = AnnotationDb::new(scan_options(args));
    let locations = resolve_locations(args, db.locator());
    db.scan(&locations).context("Classpath scan failed")?;
    debug!("{}", db.annotation_index_report());
    Ok(db)
}

fn write_output(
    out: &mut impl Write,
    format: OutputFormat,
    values: &BTreeMap<String, String>,
) -> io::Result<()> {
    match format {
        OutputFormat::Properties => write_properties(out, HEADER, values),
        OutputFormat::Json => write_json(out, values),
    }
}
