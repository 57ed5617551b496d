use crate::{
    IsoError, SECTOR_SIZE,
    writer::{FLAG_DIRECTORY, JOLIET_ESCAPE, STANDARD_ID},
};

const FIRST_DESCRIPTOR_SECTOR: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Root-level contents of an image, as seen through each directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoVolume {
    pub system_id: String,
    pub volume_id: String,
    pub joliet_volume_id: Option<String>,
    pub primary: Vec<IsoEntry>,
    pub joliet: Vec<IsoEntry>,
}

impl IsoVolume {
    pub fn joliet_file(&self, name: &str) -> Option<&IsoEntry> {
        self.joliet.iter().find(|entry| entry.name == name)
    }
}

/// Read the root directories of an ISO-9660 image. Subdirectories are skipped.
pub fn read_volume(image: &[u8]) -> Result<IsoVolume, IsoError> {
    let mut primary = None;
    let mut joliet = None;

    let mut sector = FIRST_DESCRIPTOR_SECTOR;
    loop {
        let descriptor = slice(image, sector * SECTOR_SIZE, SECTOR_SIZE)?;
        if &descriptor[1..6] != STANDARD_ID {
            return Err(IsoError::BadSignature { sector });
        }
        match descriptor[0] {
            1 => primary = Some(descriptor),
            2 if &descriptor[88..91] == JOLIET_ESCAPE => joliet = Some(descriptor),
            255 => break,
            _ => {}
        }
        sector += 1;
    }

    let primary = primary.ok_or(IsoError::MissingPrimaryDescriptor)?;
    let mut volume = IsoVolume {
        system_id: decode_ascii(&primary[8..40]),
        volume_id: decode_ascii(&primary[40..72]),
        joliet_volume_id: None,
        primary: read_root(image, primary, decode_ascii)?,
        joliet: Vec::new(),
    };

    if let Some(joliet) = joliet {
        volume.joliet_volume_id = Some(decode_ucs2(&joliet[40..72]));
        volume.joliet = read_root(image, joliet, decode_ucs2)?;
    }

    Ok(volume)
}

fn read_root(
    image: &[u8],
    descriptor: &[u8],
    decode: fn(&[u8]) -> String,
) -> Result<Vec<IsoEntry>, IsoError> {
    let root = &descriptor[156..190];
    let extent = le_u32(&root[2..6]) as usize;
    let size = le_u32(&root[10..14]) as usize;
    let base = extent * SECTOR_SIZE;
    let dir = slice(image, base, size)?;

    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < dir.len() {
        let len = dir[pos] as usize;
        if len == 0 {
            // Padding up to the next sector.
            pos = (pos / SECTOR_SIZE + 1) * SECTOR_SIZE;
            continue;
        }
        if len < 34 {
            return Err(IsoError::Truncated { offset: base + pos });
        }
        let record = slice(dir, pos, len).map_err(|_| IsoError::Truncated { offset: base + pos })?;
        pos += len;

        let id_len = record[32] as usize;
        let id = slice(record, 33, id_len)?;
        if id == [0] || id == [1] || record[25] & FLAG_DIRECTORY != 0 {
            continue;
        }

        let file_extent = le_u32(&record[2..6]) as usize;
        let file_size = le_u32(&record[10..14]) as usize;
        let data = slice(image, file_extent * SECTOR_SIZE, file_size)?.to_vec();
        entries.push(IsoEntry {
            name: decode(id),
            data,
        });
    }
    Ok(entries)
}

fn slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], IsoError> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(IsoError::Truncated { offset })
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn decode_ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_owned()
}

fn decode_ucs2(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units).trim_end().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_truncated() {
        assert_eq!(
            read_volume(&[]).unwrap_err(),
            IsoError::Truncated {
                offset: FIRST_DESCRIPTOR_SECTOR * SECTOR_SIZE
            }
        );
    }

    #[test]
    fn zeroed_image_has_no_signature() {
        let image = vec![0u8; 20 * SECTOR_SIZE];
        assert_eq!(
            read_volume(&image).unwrap_err(),
            IsoError::BadSignature { sector: 16 }
        );
    }

    #[test]
    fn ucs2_names_decode() {
        assert_eq!(decode_ucs2(&[0, b'u', 0, b's', 0, b' ']), "us");
    }
}
