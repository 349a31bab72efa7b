use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::Error;

/// A single reference sequence from a FASTA file.
#[derive(Debug, Clone)]
pub struct Chromosome {
    pub name: String,
    /// Upper-case bases as written in the file (IUPAC codes kept as-is)
    pub sequence: Vec<u8>,
}

/// Open a FASTA file, transparently decompressing `.gz` (including bgzip).
fn open_fasta(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let file = File::open(path).map_err(|e| Error::io(e, path))?;
    let gzipped = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parse FASTA files and extract reference sequences.
///
/// - Names are the header text up to the first whitespace
/// - Bases are upper-cased; control characters are skipped
/// - Duplicate names across all files are rejected
pub fn parse_fasta_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Chromosome>, Error> {
    let mut chromosomes: Vec<Chromosome> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for path in paths {
        let path = path.as_ref();
        let reader = open_fasta(path)?;

        let mut current: Option<Chromosome> = None;

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| Error::io(e, path))?;

            if line.is_empty() {
                continue;
            }

            if let Some(stripped) = line.strip_prefix('>') {
                if let Some(done) = current.take() {
                    chromosomes.push(done);
                }

                let name = stripped
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| {
                        Error::Fasta(format!(
                            "empty sequence name at {}:{}",
                            path.display(),
                            line_num + 1
                        ))
                    })?
                    .to_string();

                if !seen.insert(name.clone()) {
                    return Err(Error::Fasta(format!(
                        "duplicate sequence name '{}' at {}:{}",
                        name,
                        path.display(),
                        line_num + 1
                    )));
                }

                current = Some(Chromosome {
                    name,
                    sequence: Vec::new(),
                });
            } else {
                let Some(chrom) = current.as_mut() else {
                    return Err(Error::Fasta(format!(
                        "sequence data before first header at {}:{}",
                        path.display(),
                        line_num + 1
                    )));
                };

                chrom.sequence.extend(
                    line.bytes()
                        .filter(|&b| b >= 32)
                        .map(|b| b.to_ascii_uppercase()),
                );
            }
        }

        if let Some(done) = current {
            chromosomes.push(done);
        }
    }

    if chromosomes.is_empty() {
        return Err(Error::Fasta(
            "no sequences found in FASTA files".to_string(),
        ));
    }

    Ok(chromosomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_single_chromosome() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">chr1").unwrap();
        writeln!(file, "ACGT").unwrap();
        writeln!(file, "NNNN").unwrap();

        let chroms = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(chroms.len(), 1);
        assert_eq!(chroms[0].name, "chr1");
        assert_eq!(chroms[0].sequence, b"ACGTNNNN".to_vec());
    }

    #[test]
    fn parse_multiple_chromosomes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">chr1 some comment").unwrap();
        writeln!(file, "ACG").unwrap();
        writeln!(file, ">chr2").unwrap();
        writeln!(file, "TGA").unwrap();

        let chroms = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(chroms.len(), 2);
        assert_eq!(chroms[0].name, "chr1");
        assert_eq!(chroms[0].sequence, b"ACG".to_vec());
        assert_eq!(chroms[1].name, "chr2");
        assert_eq!(chroms[1].sequence, b"TGA".to_vec());
    }

    #[test]
    fn soft_masked_bases_are_upper_cased() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">test").unwrap();
        writeln!(file, "AaCcGgTtn").unwrap();

        let chroms = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(chroms[0].sequence, b"AACCGGTTN".to_vec());
    }

    #[test]
    fn gzipped_fasta() {
        let file = tempfile::Builder::new().suffix(".fa.gz").tempfile().unwrap();
        {
            let mut enc = GzEncoder::new(file.reopen().unwrap(), Compression::default());
            enc.write_all(b">chrZ\nGTAG\n").unwrap();
            enc.finish().unwrap();
        }

        let chroms = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(chroms[0].name, "chrZ");
        assert_eq!(chroms[0].sequence, b"GTAG".to_vec());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut file1 = NamedTempFile::new().unwrap();
        writeln!(file1, ">chr1").unwrap();
        writeln!(file1, "AC").unwrap();

        let mut file2 = NamedTempFile::new().unwrap();
        writeln!(file2, ">chr1").unwrap();
        writeln!(file2, "GT").unwrap();

        let err = parse_fasta_files(&[file1.path(), file2.path()]).unwrap_err();
        assert!(err.to_string().contains("duplicate sequence name"));
    }

    #[test]
    fn empty_file_error() {
        let file = NamedTempFile::new().unwrap();
        let result = parse_fasta_files(&[file.path()]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no sequences"));
    }

    #[test]
    fn sequence_before_header_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ACGT").unwrap();

        let result = parse_fasta_files(&[file.path()]);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("sequence data before first header")
        );
    }
}
