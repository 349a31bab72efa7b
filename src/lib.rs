pub mod error;
pub mod filter;
pub mod genome;
pub mod io;
pub mod junction;
pub mod params;
pub mod stats;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;

use crate::error::Error;
use crate::filter::{BamFilterEngine, FilterEngine, RuleSet};
use crate::genome::Genome;
use crate::junction::{Junction, JunctionBuilder, JunctionIndex};
use crate::params::{Parameters, RunMode};

/// Top-level dispatcher. Called from `main()` after CLI parsing.
pub fn run(params: &Parameters) -> anyhow::Result<()> {
    params.validate()?;

    info!("portcullis v{}", env!("CARGO_PKG_VERSION"));
    info!("runMode: {}", params.run_mode);
    info!("runThreadN: {}", params.run_thread_n);

    match params.run_mode {
        RunMode::Junc => junc(params),
        RunMode::Filter => filter(params, load_rules(params)?),
        RunMode::BamFilt => bamfilt(params),
        RunMode::Full => full(params),
    }
}

/// Every stage in order, skipping stages whose outputs are all present.
fn full(params: &Parameters) -> anyhow::Result<()> {
    // Rule file problems surface before any stage runs
    let rules = load_rules(params)?;

    let junc_outputs = [params.junction_table_path(), params.junction_bed_path()];
    if should_run("junc", &junc_outputs, params.force) {
        junc(params)?;
    }
    let filter_outputs = [params.pass_table_path(), params.fail_table_path()];
    if should_run("filter", &filter_outputs, params.force) {
        filter(params, rules)?;
    }
    if params.bam_filter && should_run("bamfilt", &[params.filtered_bam_path()], params.force) {
        bamfilt(params)?;
    }

    info!("Portcullis run complete!");
    Ok(())
}

fn should_run(stage: &str, outputs: &[PathBuf], force: bool) -> bool {
    if force {
        return true;
    }
    match outputs.iter().find(|path| !path.exists()) {
        Some(missing) => {
            info!("Running {stage} stage: {} is missing", missing.display());
            true
        }
        None => {
            info!("Skipping {stage} stage: outputs exist (use --force to rerun)");
            false
        }
    }
}

fn create_dir(dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|e| Error::io(e, dir))
}

/// `<path>.partial`, the name an output carries until it is complete.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Run `write` against a `.partial` file and move it onto `path` on success.
///
/// On failure the partial file is removed and `path` is left untouched.
fn write_output<T>(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<T, Error>,
) -> Result<T, Error> {
    let partial = partial_path(path);
    let value = match write(&partial) {
        Ok(value) => value,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };
    fs::rename(&partial, path).map_err(|e| Error::io(e, path))?;
    Ok(value)
}

fn load_rules(params: &Parameters) -> Result<RuleSet, Error> {
    let rules = match &params.filter_file {
        Some(path) => {
            info!("filterFile: {}", path.display());
            RuleSet::from_file(path)?
        }
        None => {
            info!("Using default filter rules");
            RuleSet::default_rules()?
        }
    };
    info!("Loaded {} filter rules", rules.len());
    Ok(rules)
}

fn thread_pool(n: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build()
        .with_context(|| format!("cannot start {n} worker threads"))
}

/// Aggregate spliced alignments into the junction table and BED track.
fn junc(params: &Parameters) -> anyhow::Result<()> {
    let bam_path = params
        .bam_file
        .as_deref()
        .context("--bamFile is required")?;

    info!(
        "genomeFastaFile: {:?}",
        params
            .genome_fasta_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
    );
    info!("bamFile: {}", bam_path.display());

    info!("Loading genome...");
    let genome = Genome::from_fasta(&params.genome_fasta_files)?;
    genome.log_summary();

    let (header, mut reader) = io::bam::open(bam_path)?;
    let reference_names = io::bam::reference_names(&header);
    let reference_genome = genome.for_references(&reference_names);

    info!(
        "Aggregating junctions ({} threads, {} records per chunk)...",
        params.run_thread_n, params.chunk_size
    );
    let builder = JunctionBuilder::from_params(params)?;
    let source = io::bam::alignment_records(&mut reader, bam_path);
    let (index, stats) = builder.build(source, &reference_genome)?;
    stats.print_summary(index.len());

    create_dir(&params.junc_dir())?;
    let junctions = index.sorted();

    // The table goes last: its presence marks the stage complete
    write_output(&params.junction_bed_path(), |path| {
        junction::write_junction_bed(path, &junctions, &reference_names, &params.source)
    })?;
    write_output(&params.junction_table_path(), |path| {
        junction::write_junction_table(path, &junctions, false)
    })?;

    Ok(())
}

/// Classify junctions from a table and write pass/fail tables.
fn filter(params: &Parameters, rules: RuleSet) -> anyhow::Result<()> {
    let input = params.filter_input();
    info!("junctionFile: {}", input.display());

    let junctions = junction::read_junction_table(&input)?;
    info!("Loaded {} junctions", junctions.len());
    let mut index = JunctionIndex::from_junctions(junctions);

    let engine = FilterEngine::new(rules);
    let report = thread_pool(params.run_thread_n)?.install(|| engine.classify(&mut index));
    report.print_summary();

    create_dir(&params.filt_dir())?;
    let (pass, fail): (Vec<&Junction>, Vec<&Junction>) = index
        .sorted()
        .into_iter()
        .partition(|j| j.filter_result().is_some_and(|r| r.is_pass()));

    write_output(&params.fail_table_path(), |path| {
        junction::write_junction_table(path, &fail, true)
    })?;
    write_output(&params.pass_table_path(), |path| {
        junction::write_junction_table(path, &pass, false)
    })?;

    Ok(())
}

/// Write the alignments consistent with the passing junctions.
fn bamfilt(params: &Parameters) -> anyhow::Result<()> {
    let bam_path = params
        .bam_file
        .as_deref()
        .context("--bamFile is required")?;
    let pass_path = params.bamfilt_input();
    info!("bamFile: {}", bam_path.display());
    info!("junctionFile: {}", pass_path.display());

    let passing = junction::read_junction_table(&pass_path)?;
    let engine = BamFilterEngine::from_junctions(
        &passing,
        params.bam_filter_policy,
        params.strand_specific,
    );
    info!(
        "Projecting alignments onto {} passing junctions (policy: {})",
        engine.n_pass(),
        params.bam_filter_policy
    );

    create_dir(&params.out_dir)?;
    let output = params.filtered_bam_path();
    let (header, mut reader) = io::bam::open(bam_path)?;
    let stats = write_output(&output, |path| {
        let mut writer = io::bam::BamWriter::create(path, &header)?;
        let stats = engine.project(&mut reader, bam_path, &mut writer)?;
        writer.finish()?;
        Ok(stats)
    })?;
    stats.print_summary();

    Ok(())
}
