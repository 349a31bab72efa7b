/// Junction table and BED track output
use super::intron::{CanonicalSs, Intron, Strand};
use super::model::{FilterResult, Junction, JunctionMetrics};
use crate::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Column names of the junction table, in order.
const COLUMNS: [&str; 12] = [
    "seq_id",
    "start",
    "end",
    "strand",
    "left_anchor",
    "right_anchor",
    "support_count",
    "donor",
    "acceptor",
    "canonical",
    "entropy",
    "coverage",
];

/// Optional trailing column naming the first failed rule
const FAILED_RULE_COLUMN: &str = "failed_rule";

/// Write finalized junctions as a tab-separated table.
///
/// Scores use Rust's shortest round-trip float formatting, so reading the
/// table back yields bit-identical metrics. With `with_failed_rule`, a
/// trailing column holds the failing rule id (`-` for passing junctions).
pub fn write_junction_table(
    path: &Path,
    junctions: &[&Junction],
    with_failed_rule: bool,
) -> Result<(), Error> {
    let file = File::create(path).map_err(|e| Error::io(e, path))?;
    let mut writer = BufWriter::new(file);

    let mut header = COLUMNS.join("\t");
    if with_failed_rule {
        header.push('\t');
        header.push_str(FAILED_RULE_COLUMN);
    }
    writeln!(writer, "{}", header).map_err(|e| Error::io(e, path))?;

    for junction in junctions {
        let intron = junction.intron();
        let m = junction.metrics().ok_or_else(|| {
            Error::Table(format!("junction {} has not been finalized", intron))
        })?;

        write!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            intron.seq_id(),
            intron.start(),
            intron.end(),
            intron.strand(),
            junction.left_anchor(),
            junction.right_anchor(),
            junction.support_count(),
            m.donor_motif,
            m.acceptor_motif,
            m.canonical.as_str(),
            m.entropy,
            m.coverage,
        )
        .map_err(|e| Error::io(e, path))?;

        if with_failed_rule {
            let rule = match junction.filter_result() {
                Some(FilterResult::Fail(rule)) => rule.as_str(),
                _ => "-",
            };
            write!(writer, "\t{}", rule).map_err(|e| Error::io(e, path))?;
        }
        writeln!(writer).map_err(|e| Error::io(e, path))?;
    }

    writer.flush().map_err(|e| Error::io(e, path))?;
    log::info!("Wrote {} junctions to {}", junctions.len(), path.display());
    Ok(())
}

/// Read a junction table written by `write_junction_table`.
///
/// A trailing `failed_rule` column, if present, is ignored.
pub fn read_junction_table(path: &Path) -> Result<Vec<Junction>, Error> {
    let file = File::open(path).map_err(|e| Error::io(e, path))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines().enumerate();

    let Some((_, header)) = lines.next() else {
        return Err(Error::Table(format!("{}: empty file", path.display())));
    };
    let header = header.map_err(|e| Error::io(e, path))?;
    let names: Vec<&str> = header.split('\t').collect();
    if names.len() < COLUMNS.len() || names[..COLUMNS.len()] != COLUMNS {
        return Err(Error::Table(format!(
            "{}: unexpected header '{}'",
            path.display(),
            header
        )));
    }

    let mut junctions = Vec::new();
    for (line_num, line) in lines {
        let line = line.map_err(|e| Error::io(e, path))?;
        if line.is_empty() {
            continue;
        }
        let junction = parse_row(&line).map_err(|reason| {
            Error::Table(format!("{}:{}: {}", path.display(), line_num + 1, reason))
        })?;
        junctions.push(junction);
    }

    log::info!("Read {} junctions from {}", junctions.len(), path.display());
    Ok(junctions)
}

fn parse_row(line: &str) -> Result<Junction, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != COLUMNS.len() && fields.len() != COLUMNS.len() + 1 {
        return Err(format!(
            "expected {} columns, found {}",
            COLUMNS.len(),
            fields.len()
        ));
    }

    fn num<T: std::str::FromStr>(fields: &[&str], i: usize) -> Result<T, String> {
        fields[i]
            .parse()
            .map_err(|_| format!("invalid {} '{}'", COLUMNS[i], fields[i]))
    }

    let strand = fields[3]
        .chars()
        .next()
        .filter(|_| fields[3].len() == 1)
        .and_then(Strand::from_char)
        .ok_or_else(|| format!("invalid strand '{}'", fields[3]))?;

    let intron = Intron::new(num(&fields, 0)?, num(&fields, 1)?, num(&fields, 2)?, strand)
        .map_err(|e| e.to_string())?;
    let left_anchor: u64 = num(&fields, 4)?;
    let right_anchor: u64 = num(&fields, 5)?;
    if left_anchor > intron.start() || right_anchor < intron.end() {
        return Err(format!(
            "anchors {}..{} do not enclose intron {}",
            left_anchor, right_anchor, intron
        ));
    }

    let canonical = CanonicalSs::parse(fields[9])
        .ok_or_else(|| format!("invalid canonical '{}'", fields[9]))?;

    let metrics = JunctionMetrics {
        donor_motif: fields[7].to_string(),
        acceptor_motif: fields[8].to_string(),
        canonical,
        entropy: num(&fields, 10)?,
        coverage: num(&fields, 11)?,
    };

    Ok(Junction::from_parts(
        intron,
        left_anchor,
        right_anchor,
        num(&fields, 6)?,
        metrics,
    ))
}

/// Write a BED12 track: one feature per junction, thick part the intron,
/// two blocks for the flanking anchors.
pub fn write_junction_bed<S: AsRef<str>>(
    path: &Path,
    junctions: &[&Junction],
    reference_names: &[S],
    source: &str,
) -> Result<(), Error> {
    let file = File::create(path).map_err(|e| Error::io(e, path))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "track name=\"junctions\" description=\"{} junctions\"", source)
        .map_err(|e| Error::io(e, path))?;

    for (i, junction) in junctions.iter().enumerate() {
        let intron = junction.intron();
        let chrom = reference_names
            .get(intron.seq_id())
            .map(|n| n.as_ref())
            .ok_or_else(|| Error::UnknownReference(intron.seq_id()))?;

        let chrom_start = junction.left_anchor();
        let chrom_end = junction.right_anchor() + 1;
        let strand = match intron.strand() {
            Strand::Unknown => '.',
            s => s.as_char(),
        };

        writeln!(
            writer,
            "{}\t{}\t{}\t{}_{}\t{}\t{}\t{}\t{}\t255,0,0\t2\t{},{}\t0,{}",
            chrom,
            chrom_start,
            chrom_end,
            source,
            i + 1,
            junction.support_count().min(1000),
            strand,
            intron.start(),
            intron.end() + 1,
            junction.max_left_overhang(),
            junction.max_right_overhang(),
            intron.end() + 1 - chrom_start,
        )
        .map_err(|e| Error::io(e, path))?;
    }

    writer.flush().map_err(|e| Error::io(e, path))?;
    log::info!("Wrote {} junctions to {}", junctions.len(), path.display());
    Ok(())
}
