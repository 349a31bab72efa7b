/// BAM input decoding and filtered BAM output with noodles
use crate::error::Error;
use crate::io::alignment::{AlignmentRecord, CigarOp};
use crate::junction::Strand;
use noodles::bam;
use noodles::sam;
use noodles::sam::alignment::io::Write as SamWrite;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::RecordBuf;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

/// Strand tag written by spliced aligners
fn xs_tag() -> Tag {
    Tag::new(b'X', b'S')
}

/// Open a BAM file and read its header.
pub fn open(path: &Path) -> Result<(sam::Header, bam::io::Reader<impl Read>), Error> {
    let file = File::open(path).map_err(|e| Error::io(e, path))?;
    let mut reader = bam::io::Reader::new(file);
    let header = reader
        .read_header()
        .map_err(|e| Error::Bam(format!("{}: cannot read header: {}", path.display(), e)))?;
    Ok((header, reader))
}

/// Reference sequence names in header order (the order record ids index).
pub fn reference_names(header: &sam::Header) -> Vec<String> {
    header
        .reference_sequences()
        .keys()
        .map(|name| name.to_string())
        .collect()
}

/// Stream of decoded records from an open reader.
///
/// Container-level read failures end the stream with `Error::Bam`; records
/// that decode but carry a broken CIGAR come through as `MalformedAlignment`.
pub fn alignment_records<'r, R: Read>(
    reader: &'r mut bam::io::Reader<R>,
    path: &'r Path,
) -> impl Iterator<Item = Result<AlignmentRecord, Error>> + 'r {
    reader.records().map(move |result| {
        let record =
            result.map_err(|e| Error::Bam(format!("{}: {}", path.display(), e)))?;
        decode(&record)
    })
}

/// Reduce a BAM record to what junction analysis needs.
pub fn decode(record: &bam::Record) -> Result<AlignmentRecord, Error> {
    let malformed = |what: &str, e: std::io::Error| {
        Error::MalformedAlignment(format!("invalid {what}: {e}"))
    };

    let reference_sequence_id = record
        .reference_sequence_id()
        .transpose()
        .map_err(|e| malformed("reference sequence id", e))?;

    let alignment_start = record
        .alignment_start()
        .transpose()
        .map_err(|e| malformed("alignment start", e))?
        .map(|pos| pos.get() as u64 - 1)
        .unwrap_or(0);

    let mut cigar = Vec::new();
    for op in record.cigar().iter() {
        let op = op.map_err(|e| malformed("CIGAR", e))?;
        let len = u32::try_from(op.len())
            .map_err(|_| Error::MalformedAlignment(format!("CIGAR op too long: {}", op.len())))?;
        cigar.push(match op.kind() {
            Kind::Match => CigarOp::Match(len),
            Kind::SequenceMatch => CigarOp::Equal(len),
            Kind::SequenceMismatch => CigarOp::Diff(len),
            Kind::Insertion => CigarOp::Ins(len),
            Kind::Deletion => CigarOp::Del(len),
            Kind::Skip => CigarOp::RefSkip(len),
            Kind::SoftClip => CigarOp::SoftClip(len),
            Kind::HardClip => CigarOp::HardClip(len),
            Kind::Pad => CigarOp::Pad(len),
        });
    }

    Ok(AlignmentRecord {
        reference_sequence_id,
        alignment_start,
        cigar,
        flags: record.flags(),
        xs_strand: xs_strand(record),
    })
}

/// Strand from the `XS` tag; absent or unreadable tags give `None`.
fn xs_strand(record: &bam::Record) -> Option<Strand> {
    use noodles::sam::alignment::record::data::field::Value;

    let value = record.data().get(&xs_tag())?.ok()?;
    let c = match value {
        Value::Character(c) => c,
        Value::String(s) => *s.first()?,
        _ => return None,
    };
    Strand::from_char(c as char)
}

/// Build an owned record for writing (used to assemble BAM inputs).
pub fn build_record(name: &str, alignment: &AlignmentRecord) -> Result<RecordBuf, Error> {
    use noodles::core::Position;
    use noodles::sam::alignment::record::cigar::Op;
    use noodles::sam::alignment::record_buf::Cigar;
    use noodles::sam::alignment::record_buf::data::field::Value;

    let mut record = RecordBuf::default();
    record.name_mut().replace(name.into());
    *record.flags_mut() = alignment.flags;
    *record.reference_sequence_id_mut() = alignment.reference_sequence_id;
    if alignment.reference_sequence_id.is_some() {
        let pos = alignment.alignment_start as usize + 1;
        *record.alignment_start_mut() = Some(
            Position::try_from(pos)
                .map_err(|e| Error::Bam(format!("invalid alignment position {pos}: {e}")))?,
        );
    }

    let mut cigar = Cigar::default();
    for op in &alignment.cigar {
        let kind = match op {
            CigarOp::Match(_) => Kind::Match,
            CigarOp::Equal(_) => Kind::SequenceMatch,
            CigarOp::Diff(_) => Kind::SequenceMismatch,
            CigarOp::Ins(_) => Kind::Insertion,
            CigarOp::Del(_) => Kind::Deletion,
            CigarOp::RefSkip(_) => Kind::Skip,
            CigarOp::SoftClip(_) => Kind::SoftClip,
            CigarOp::HardClip(_) => Kind::HardClip,
            CigarOp::Pad(_) => Kind::Pad,
        };
        cigar.as_mut().push(Op::new(kind, op.len() as usize));
    }
    *record.cigar_mut() = cigar;

    if let Some(strand) = alignment.xs_strand {
        record
            .data_mut()
            .insert(xs_tag(), Value::Character(strand.as_char() as u8));
    }

    Ok(record)
}

/// BAM file writer (streaming, order-preserving)
///
/// Records are written exactly in the order they are handed over, with the
/// header of the input they came from.
pub struct BamWriter {
    writer: bam::io::Writer<noodles::bgzf::Writer<BufWriter<File>>>,
    header: sam::Header,
    path: PathBuf,
    n_written: u64,
}

impl BamWriter {
    pub fn create(output_path: &Path, header: &sam::Header) -> Result<Self, Error> {
        let file = File::create(output_path).map_err(|e| Error::io(e, output_path))?;
        let mut writer = bam::io::Writer::new(BufWriter::new(file));
        writer
            .write_header(header)
            .map_err(|e| Error::io(e, output_path))?;

        Ok(Self {
            writer,
            header: header.clone(),
            path: output_path.to_path_buf(),
            n_written: 0,
        })
    }

    /// Write one record unchanged.
    pub fn write(&mut self, record: &dyn sam::alignment::Record) -> Result<(), Error> {
        self.writer
            .write_alignment_record(&self.header, record)
            .map_err(|e| Error::io(e, &self.path))?;
        self.n_written += 1;
        Ok(())
    }

    /// Flush and close BAM file
    pub fn finish(mut self) -> Result<u64, Error> {
        self.writer
            .finish(&self.header)
            .map_err(|e| Error::io(e, &self.path))?;
        log::info!(
            "Wrote {} alignments to {}",
            self.n_written,
            self.path.display()
        );
        Ok(self.n_written)
    }
}
