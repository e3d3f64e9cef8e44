use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::*;
use memmap2::Mmap;
use structopt::StructOpt;

use zipwire::write::{Sink, WriteOptions, ZipWriter};
use zipwire::{Zip64Mode, ZipArchive, ZipEntry};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "repack",
    about = "Copies a .zip archive entry-for-entry without recompressing \
             anything, optionally splitting the output into segments"
)]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Roll the output over into numbered segments (.z01, .z02, ...) of at
    /// most this many bytes each.
    #[structopt(short, long)]
    split_size: Option<u64>,

    /// Write Zip64 structures for every entry, sizes notwithstanding.
    #[structopt(long)]
    zip64: bool,

    /// List the entries in physical order instead of writing anything.
    #[structopt(short = "n", long)]
    dry_run: bool,

    input: PathBuf,
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    info!("Memory mapping {:#?}", &args.input);
    let zip_file = File::open(&args.input).context("Couldn't open zip file")?;
    let mapping = unsafe { Mmap::map(&zip_file).context("Couldn't mmap zip file")? };
    let archive = ZipArchive::new(&mapping).context("Couldn't load archive")?;

    let preamble = archive.preamble()?;
    if !preamble.is_empty() {
        warn!(
            "{} bytes of preamble (self-extractor stub?) won't be copied",
            preamble.len()
        );
    }

    if args.dry_run {
        println!("{:>12}  {:>12}  name", "size", "compressed");
        for entry in archive.entries_in_physical_order() {
            println!(
                "{:>12}  {:>12}  {}",
                entry.size.unwrap_or(0),
                entry.compressed_size.unwrap_or(0),
                entry.name,
            );
        }
        return Ok(());
    }

    let options = WriteOptions {
        zip64: if args.zip64 {
            Zip64Mode::Always
        } else {
            Zip64Mode::AsNeeded
        },
        ..WriteOptions::default()
    };

    let report = match args.split_size {
        Some(limit) => {
            let base = args.output.clone();
            let mut writer = ZipWriter::split(
                limit,
                move |disk| {
                    let segment = base.with_extension(format!("z{:02}", disk + 1));
                    info!("starting segment {:#?}", segment);
                    io::Result::Ok(BufWriter::new(File::create(segment)?))
                },
                options,
            );
            copy_entries(&archive, &mut writer)?;
            writer.finish()?
        }
        None => {
            let out = File::create(&args.output).context("Couldn't create output file")?;
            let mut writer = ZipWriter::with_options(BufWriter::new(out), options);
            copy_entries(&archive, &mut writer)?;
            writer.finish()?
        }
    };

    println!(
        "{} entries across {} segment(s); central directory {} bytes{}{}",
        report.entry_count,
        report.segments,
        report.central_directory_length,
        if report.zip64 { "; Zip64" } else { "" },
        if report.degraded_to_never > 0 {
            "; some entries fell back to data descriptors"
        } else {
            ""
        },
    );
    Ok(())
}

/// Moves every entry's compressed payload verbatim — the whole point:
/// nothing gets inflated and re-deflated on the way through.
fn copy_entries<S: Sink>(archive: &ZipArchive, writer: &mut ZipWriter<S>) -> Result<()> {
    writer.set_comment(archive.comment());
    for entry in archive.entries_in_physical_order() {
        debug!("copying {}", entry.name);
        let raw = archive.read_raw(entry)?;
        writer.add_raw_entry(ZipEntry::clone(entry), raw)?;
    }
    Ok(())
}
