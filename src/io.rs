//! On-disk `.cv` format v2: one composition vector per file.
//! All integers are little-endian; the component array starts 8-byte aligned.
//!
//! Layout: 48-byte header, then `nnz` [`Component`] pairs (`index: u64`,
//! `value: f64`) sorted by index. Besides the geometry, the header records the
//! [`Provenance`] of the vector so a cache can tell stale entries apart.

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use crate::composition::{Background, Component, CompositionVector};
use crate::encode::ALPHABET_SIZE;
use crate::radix::Radix;
use crate::signature::{InvalidResidue, SignatureError};

pub const CV_MAGIC: u32 = 0x43_56_54_31; // "CVT1"
pub const CV_VERSION: u32 = 2;
pub const HEADER_LEN: usize = 48;

/// Build settings and input a stored vector came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Provenance {
    pub invalid_residues: InvalidResidue,
    pub min_record_len: u64,
    /// Fingerprint of the genome file; 0 when unknown.
    pub source: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub k: u16,
    pub alphabet: u8,
    pub background: u8,
    pub invalid_residues: u8,
    pub reserved: [u8; 3],
    pub min_record_len: u64,
    pub source: u64,
    pub nnz: u64,
    pub total_kmers: u64,
}

impl FileHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LE>(self.magic)?;
        w.write_u32::<LE>(self.version)?;
        w.write_u16::<LE>(self.k)?;
        w.write_u8(self.alphabet)?;
        w.write_u8(self.background)?;
        w.write_u8(self.invalid_residues)?;
        w.write_all(&self.reserved)?;
        w.write_u64::<LE>(self.min_record_len)?;
        w.write_u64::<LE>(self.source)?;
        w.write_u64::<LE>(self.nnz)?;
        w.write_u64::<LE>(self.total_kmers)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let mut h = FileHeader {
            magic: r.read_u32::<LE>()?,
            version: r.read_u32::<LE>()?,
            k: r.read_u16::<LE>()?,
            alphabet: r.read_u8()?,
            background: r.read_u8()?,
            invalid_residues: r.read_u8()?,
            ..Default::default()
        };
        r.read_exact(&mut h.reserved)?;
        h.min_record_len = r.read_u64::<LE>()?;
        h.source = r.read_u64::<LE>()?;
        h.nnz = r.read_u64::<LE>()?;
        h.total_kmers = r.read_u64::<LE>()?;
        Ok(h)
    }
}

/// Writer that serializes a [`CompositionVector`] to a `.cv` file.
pub struct VectorWriter<'a> {
    vector: &'a CompositionVector,
    provenance: Provenance,
}

impl<'a> VectorWriter<'a> {
    pub fn new(vector: &'a CompositionVector) -> Self {
        Self {
            vector,
            provenance: Provenance::default(),
        }
    }

    /// Record where the vector came from.
    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Serialize into any writer.
    pub fn write_into<W: Write>(&self, w: &mut W) -> Result<(), SignatureError> {
        let v = self.vector;
        let header = FileHeader {
            magic: CV_MAGIC,
            version: CV_VERSION,
            k: v.radix().k() as u16,
            alphabet: ALPHABET_SIZE as u8,
            background: v.background() as u8,
            invalid_residues: self.provenance.invalid_residues as u8,
            reserved: [0; 3],
            min_record_len: self.provenance.min_record_len,
            source: self.provenance.source,
            nnz: v.components().len() as u64,
            total_kmers: v.total_kmers(),
        };
        header.write_to(w)?;
        w.write_all(bytemuck::cast_slice::<Component, u8>(v.components()))?;
        Ok(())
    }

    /// Serialize to `path`. Each call writes its own sibling temp file and
    /// renames it into place, so readers and concurrent writers never see a
    /// partial file.
    pub fn write_to(&self, path: &Path) -> Result<(), SignatureError> {
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".cv-")
            .suffix(".partial")
            .tempfile_in(dir)?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            self.write_into(&mut out)?;
            out.flush()?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Write `vector` to `path`.
pub fn write_vector(vector: &CompositionVector, path: &Path) -> Result<(), SignatureError> {
    VectorWriter::new(vector).write_to(path)
}

/// Decode a `.cv` image already in memory.
pub fn decode_vector(bytes: &[u8]) -> Result<CompositionVector, SignatureError> {
    decode_stamped_vector(bytes).map(|(v, _)| v)
}

/// Decode a `.cv` image together with its [`Provenance`].
pub fn decode_stamped_vector(bytes: &[u8]) -> Result<(CompositionVector, Provenance), SignatureError> {
    if bytes.len() < HEADER_LEN {
        return Err(SignatureError::Format("truncated header".into()));
    }
    let header = FileHeader::read_from(&mut Cursor::new(&bytes[..HEADER_LEN]))?;
    if header.magic != CV_MAGIC {
        return Err(SignatureError::Format("bad magic".into()));
    }
    if header.version != CV_VERSION {
        return Err(SignatureError::Format(format!(
            "unsupported version {}",
            header.version
        )));
    }
    if header.alphabet as u64 != ALPHABET_SIZE {
        return Err(SignatureError::Format(format!(
            "alphabet size {} not supported",
            header.alphabet
        )));
    }
    let radix = Radix::new(header.k as usize)?;
    let background = Background::from_u8(header.background)
        .ok_or_else(|| SignatureError::Format(format!("unknown background {}", header.background)))?;
    let provenance = Provenance {
        invalid_residues: InvalidResidue::from_u8(header.invalid_residues).ok_or_else(|| {
            SignatureError::Format(format!("unknown residue policy {}", header.invalid_residues))
        })?,
        min_record_len: header.min_record_len,
        source: header.source,
    };

    let body = &bytes[HEADER_LEN..];
    let expected = (header.nnz as usize)
        .checked_mul(std::mem::size_of::<Component>())
        .ok_or_else(|| SignatureError::Format("component count overflows".into()))?;
    if body.len() != expected {
        return Err(SignatureError::Format(format!(
            "payload is {} bytes, header promises {}",
            body.len(),
            expected
        )));
    }
    let components: Vec<Component> = match bytemuck::try_cast_slice::<u8, Component>(body) {
        Ok(slice) => slice.to_vec(),
        // unaligned buffer: copy through a properly aligned allocation
        Err(_) => body
            .chunks_exact(std::mem::size_of::<Component>())
            .map(bytemuck::pod_read_unaligned)
            .collect(),
    };
    let vector = CompositionVector::from_parts(radix, background, header.total_kmers, components)?;
    Ok((vector, provenance))
}

/// Read a `.cv` file via mmap.
pub fn read_vector(path: &Path) -> Result<CompositionVector, SignatureError> {
    read_stamped_vector(path).map(|(v, _)| v)
}

/// Read a `.cv` file and the [`Provenance`] stored with it.
pub fn read_stamped_vector(path: &Path) -> Result<(CompositionVector, Provenance), SignatureError> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < HEADER_LEN as u64 {
        return Err(SignatureError::Format("truncated header".into()));
    }
    // The file is private to the cache and only replaced by rename, never rewritten in place.
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    decode_stamped_vector(&map)
}
