// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Parser, Subcommand};
use rockcrate::database::{parse_database, write_database, Database};
use rockcrate::indexer::{build_database, IndexOptions};
use rockcrate::metadata::PathRewrite;
use rockcrate::migrate::migrate_stats;
use rockcrate::tagcache::{master_path, tag_file_path, Tag};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rockcrate", version, about = "Build and inspect Rockbox tagcache databases")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a music directory into a fresh tagcache database.
    Build {
        /// Directory containing the music collection.
        music_root: PathBuf,
        /// Directory the database files are written into.
        #[arg(short, long)]
        output: PathBuf,
        /// Path prefix under which the device sees the music files.
        #[arg(long, default_value = "/")]
        device_prefix: String,
        /// Carry runtime statistics over from an existing database directory.
        #[arg(long)]
        migrate_from: Option<PathBuf>,
        /// Canonicalise a genre, e.g. `--genre "Alt-Rock=Rock"`. May be repeated.
        #[arg(long = "genre", value_parser = parse_genre_mapping)]
        genre_mappings: Vec<(String, String)>,
        /// Number of metadata extraction workers (0 = number of cores).
        #[arg(long, default_value_t = 0)]
        workers: usize,
        /// Build serial recorded in the database headers.
        #[arg(long, default_value_t = 0)]
        serial: u32,
    },
    /// Print the contents of a database directory.
    Dump {
        /// Directory containing the database files.
        database: PathBuf,
    },
    /// Copy runtime statistics from an old database onto a new one, in place.
    Migrate {
        /// Directory containing the old database.
        #[arg(long)]
        old: PathBuf,
        /// Directory containing the new database.
        new: PathBuf,
    },
}

fn parse_genre_mapping(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(from, to)| (from.to_owned(), to.to_owned()))
        .ok_or_else(|| format!("expected FROM=TO, got {raw:?}"))
}

/// Remove the database files of a previous build so the directory only contains the new
/// generation afterwards.
fn clear_database_dir(dir: &Path) -> rockcrate::Result<()> {
    let mut paths: Vec<PathBuf> = Tag::STRINGS
        .iter()
        .map(|&tag| tag_file_path(dir, tag))
        .collect();
    paths.push(master_path(dir));
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(rockcrate::Error::Io { path, source: err }),
        }
    }
    Ok(())
}

fn dump(db: &Database) {
    println!("database serial {}, {} entries", db.serial(), db.len());
    for entry in db.entries() {
        let filename = db
            .string_value(entry, Tag::Filename)
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        println!("{filename}");
        for tag in Tag::STRINGS {
            if tag == Tag::Filename {
                continue;
            }
            if let Some(value) = db.string_value(entry, tag) {
                println!("  {tag}: {}", String::from_utf8_lossy(value));
            }
        }
        for tag in Tag::NUMERICS {
            let value = entry.numeric(tag);
            if value != 0 {
                println!("  {tag}: {value}");
            }
        }
    }
}

fn main() -> rockcrate::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            music_root,
            output,
            device_prefix,
            migrate_from,
            genre_mappings,
            workers,
            serial,
        } => {
            let rewrite = PathRewrite::new(&music_root, device_prefix);
            let options = IndexOptions {
                genre_map: genre_mappings.into_iter().collect(),
                workers,
                serial,
                ..IndexOptions::default()
            };
            let (mut db, report) = build_database(&music_root, &rewrite, &options)?;
            for (path, err) in &report.skipped {
                eprintln!("skipped {}: {err}", path.display());
            }

            if let Some(old_dir) = migrate_from {
                let old = parse_database(&old_dir)?;
                db = migrate_stats(&old, db);
            }

            std::fs::create_dir_all(&output).map_err(|err| rockcrate::Error::Io {
                path: output.clone(),
                source: err,
            })?;
            clear_database_dir(&output)?;
            write_database(&db, &output)?;
            println!(
                "wrote {} entries to {} ({} files skipped)",
                db.len(),
                output.display(),
                report.skipped.len()
            );
        }
        Commands::Dump { database } => {
            let db = parse_database(&database)?;
            dump(&db);
        }
        Commands::Migrate { old, new } => {
            let old_db = parse_database(&old)?;
            let new_db = parse_database(&new)?;
            let migrated = migrate_stats(&old_db, new_db);
            write_database(&migrated, &new)?;
            println!("updated statistics in {}", new.display());
        }
    }
    Ok(())
}
