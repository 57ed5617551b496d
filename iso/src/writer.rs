use crate::{
    IsoError, IsoTimestamp, SECTOR_SIZE,
    datetime::UNSET_DESCRIPTOR_TIME,
};

const PRIMARY_DESCRIPTOR_SECTOR: u32 = 16;
const JOLIET_DESCRIPTOR_SECTOR: u32 = 17;
const TERMINATOR_SECTOR: u32 = 18;
const PRIMARY_L_PATH_TABLE_SECTOR: u32 = 19;
const PRIMARY_M_PATH_TABLE_SECTOR: u32 = 20;
const JOLIET_L_PATH_TABLE_SECTOR: u32 = 21;
const JOLIET_M_PATH_TABLE_SECTOR: u32 = 22;
const FIRST_DIRECTORY_SECTOR: u32 = 23;

pub(crate) const STANDARD_ID: &[u8; 5] = b"CD001";
pub(crate) const JOLIET_ESCAPE: &[u8; 3] = b"%/E"; // UCS-2 level 3
pub(crate) const FLAG_DIRECTORY: u8 = 0x02;

const DESCRIPTOR_PRIMARY: u8 = 1;
const DESCRIPTOR_SUPPLEMENTARY: u8 = 2;
const DESCRIPTOR_TERMINATOR: u8 = 255;

// Root-only path table: one 10-byte entry.
const PATH_TABLE_SIZE: u32 = 10;

const MAX_ISO_NAME_LEN: usize = 32;
const MAX_JOLIET_NAME_LEN: usize = 64;

#[derive(Debug, Clone)]
struct IsoFile {
    iso_name: String,
    joliet_name: String,
    data: Vec<u8>,
}

/// Builds a flat ISO-9660 image (interchange level 3) with a Joliet tree.
#[derive(Debug, Clone)]
pub struct IsoBuilder {
    system_id: String,
    volume_id: String,
    timestamp: IsoTimestamp,
    files: Vec<IsoFile>,
}

impl IsoBuilder {
    pub fn new(volume_id: impl Into<String>) -> Self {
        Self {
            system_id: String::new(),
            volume_id: volume_id.into(),
            timestamp: IsoTimestamp::now(),
            files: Vec::new(),
        }
    }

    pub fn system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = system_id.into();
        self
    }

    pub fn timestamp(mut self, timestamp: IsoTimestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add a root-level file under its ISO-9660 name (`NAME.EXT;1`) and its
    /// Joliet name. A single leading `/` on either name is accepted.
    pub fn add_file(
        &mut self,
        iso_name: &str,
        joliet_name: &str,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), IsoError> {
        let iso_name = iso_name.strip_prefix('/').unwrap_or(iso_name);
        let joliet_name = joliet_name.strip_prefix('/').unwrap_or(joliet_name);
        validate_iso_name(iso_name)?;
        validate_joliet_name(joliet_name)?;

        for file in &self.files {
            if file.iso_name == iso_name {
                return Err(IsoError::DuplicateName {
                    name: iso_name.to_owned(),
                });
            }
            if file.joliet_name == joliet_name {
                return Err(IsoError::DuplicateName {
                    name: joliet_name.to_owned(),
                });
            }
        }

        let data = data.into();
        if u32::try_from(data.len()).is_err() {
            return Err(IsoError::FileTooLarge {
                name: iso_name.to_owned(),
            });
        }

        self.files.push(IsoFile {
            iso_name: iso_name.to_owned(),
            joliet_name: joliet_name.to_owned(),
            data,
        });
        Ok(())
    }

    pub fn build(&self) -> Result<Vec<u8>, IsoError> {
        for encoding in [Encoding::Ascii, Encoding::Ucs2] {
            encoding.check("system identifier", &self.system_id, 32)?;
            encoding.check("volume identifier", &self.volume_id, 32)?;
        }

        // File extents follow both directories; directory sizes only depend on names.
        let primary_ids: Vec<Vec<u8>> = self
            .files
            .iter()
            .map(|f| Encoding::Ascii.encode(&f.iso_name))
            .collect();
        let joliet_ids: Vec<Vec<u8>> = self
            .files
            .iter()
            .map(|f| Encoding::Ucs2.encode(&f.joliet_name))
            .collect();

        let primary_dir_len = directory_len(&primary_ids);
        let joliet_dir_len = directory_len(&joliet_ids);
        let primary_dir_sector = FIRST_DIRECTORY_SECTOR;
        let joliet_dir_sector = primary_dir_sector + sectors(primary_dir_len);

        let mut next_sector = joliet_dir_sector + sectors(joliet_dir_len);
        let mut extents = Vec::with_capacity(self.files.len());
        for file in &self.files {
            extents.push(next_sector);
            next_sector += sectors(file.data.len());
        }
        let total_sectors = next_sector;

        let mut image = vec![0u8; total_sectors as usize * SECTOR_SIZE];

        let primary_root = DirectoryExtent {
            sector: primary_dir_sector,
            len: primary_dir_len as u32,
        };
        let joliet_root = DirectoryExtent {
            sector: joliet_dir_sector,
            len: joliet_dir_len as u32,
        };

        let primary = VolumeDescriptor {
            kind: DESCRIPTOR_PRIMARY,
            encoding: Encoding::Ascii,
            root: primary_root,
            l_path_table: PRIMARY_L_PATH_TABLE_SECTOR,
            m_path_table: PRIMARY_M_PATH_TABLE_SECTOR,
        };
        let joliet = VolumeDescriptor {
            kind: DESCRIPTOR_SUPPLEMENTARY,
            encoding: Encoding::Ucs2,
            root: joliet_root,
            l_path_table: JOLIET_L_PATH_TABLE_SECTOR,
            m_path_table: JOLIET_M_PATH_TABLE_SECTOR,
        };

        put_sector(
            &mut image,
            PRIMARY_DESCRIPTOR_SECTOR,
            &primary.encode(self, total_sectors),
        );
        put_sector(
            &mut image,
            JOLIET_DESCRIPTOR_SECTOR,
            &joliet.encode(self, total_sectors),
        );
        put_sector(&mut image, TERMINATOR_SECTOR, &terminator());

        put_sector(
            &mut image,
            PRIMARY_L_PATH_TABLE_SECTOR,
            &path_table(primary_root.sector, false),
        );
        put_sector(
            &mut image,
            PRIMARY_M_PATH_TABLE_SECTOR,
            &path_table(primary_root.sector, true),
        );
        put_sector(
            &mut image,
            JOLIET_L_PATH_TABLE_SECTOR,
            &path_table(joliet_root.sector, false),
        );
        put_sector(
            &mut image,
            JOLIET_M_PATH_TABLE_SECTOR,
            &path_table(joliet_root.sector, true),
        );

        let primary_dir = self.encode_directory(primary_root, &primary_ids, &extents);
        put_sector(&mut image, primary_root.sector, &primary_dir);
        let joliet_dir = self.encode_directory(joliet_root, &joliet_ids, &extents);
        put_sector(&mut image, joliet_root.sector, &joliet_dir);

        for (file, extent) in self.files.iter().zip(&extents) {
            put_sector(&mut image, *extent, &file.data);
        }

        Ok(image)
    }

    fn encode_directory(&self, dir: DirectoryExtent, ids: &[Vec<u8>], extents: &[u32]) -> Vec<u8> {
        let time = self.timestamp.to_record_bytes();

        let mut entries: Vec<(usize, &Vec<u8>)> = ids.iter().enumerate().collect();
        entries.sort_by(|a, b| a.1.cmp(b.1));

        let mut records = vec![
            directory_record(dir.sector, dir.len, FLAG_DIRECTORY, &[0], &time),
            directory_record(dir.sector, dir.len, FLAG_DIRECTORY, &[1], &time),
        ];
        for (index, id) in entries {
            let size = self.files[index].data.len() as u32;
            records.push(directory_record(extents[index], size, 0, id, &time));
        }

        // Records may not straddle a sector boundary.
        let mut out = Vec::with_capacity(dir.len as usize);
        for record in records {
            let used = out.len() % SECTOR_SIZE;
            if used + record.len() > SECTOR_SIZE {
                out.resize(out.len() + SECTOR_SIZE - used, 0);
            }
            out.extend_from_slice(&record);
        }
        out.resize(dir.len as usize, 0);
        out
    }
}

#[derive(Debug, Copy, Clone)]
struct DirectoryExtent {
    sector: u32,
    len: u32,
}

struct VolumeDescriptor {
    kind: u8,
    encoding: Encoding,
    root: DirectoryExtent,
    l_path_table: u32,
    m_path_table: u32,
}

impl VolumeDescriptor {
    fn encode(&self, builder: &IsoBuilder, total_sectors: u32) -> Vec<u8> {
        let mut d = vec![0u8; SECTOR_SIZE];
        let enc = self.encoding;

        d[0] = self.kind;
        d[1..6].copy_from_slice(STANDARD_ID);
        d[6] = 1;
        enc.fill(&mut d[8..40], &builder.system_id);
        enc.fill(&mut d[40..72], &builder.volume_id);
        d[80..88].copy_from_slice(&both_u32(total_sectors));
        if self.kind == DESCRIPTOR_SUPPLEMENTARY {
            d[88..91].copy_from_slice(JOLIET_ESCAPE);
        }
        d[120..124].copy_from_slice(&both_u16(1)); // volume set size
        d[124..128].copy_from_slice(&both_u16(1)); // volume sequence number
        d[128..132].copy_from_slice(&both_u16(SECTOR_SIZE as u16));
        d[132..140].copy_from_slice(&both_u32(PATH_TABLE_SIZE));
        d[140..144].copy_from_slice(&self.l_path_table.to_le_bytes());
        d[148..152].copy_from_slice(&self.m_path_table.to_be_bytes());

        let time = builder.timestamp.to_record_bytes();
        let root = directory_record(self.root.sector, self.root.len, FLAG_DIRECTORY, &[0], &time);
        d[156..190].copy_from_slice(&root);

        for range in [190..318, 318..446, 446..574, 574..702, 702..739, 739..776, 776..813] {
            enc.fill(&mut d[range], "");
        }

        let created = builder.timestamp.to_descriptor_bytes();
        d[813..830].copy_from_slice(&created);
        d[830..847].copy_from_slice(&created);
        d[847..864].copy_from_slice(&UNSET_DESCRIPTOR_TIME);
        d[864..881].copy_from_slice(&UNSET_DESCRIPTOR_TIME);
        d[881] = 1; // file structure version
        d
    }
}

#[derive(Debug, Copy, Clone)]
enum Encoding {
    Ascii,
    Ucs2,
}

impl Encoding {
    fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Ascii => text.as_bytes().to_vec(),
            Encoding::Ucs2 => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    fn check(self, field: &'static str, text: &str, max: usize) -> Result<(), IsoError> {
        if self.encode(text).len() > max {
            return Err(IsoError::IdentifierTooLong {
                field,
                value: text.to_owned(),
                max,
            });
        }
        Ok(())
    }

    /// Write `text` into a fixed-width field padded with spaces.
    fn fill(self, field: &mut [u8], text: &str) {
        for (i, byte) in field.iter_mut().enumerate() {
            *byte = match self {
                Encoding::Ascii => b' ',
                Encoding::Ucs2 if i % 2 == 0 => 0x00,
                Encoding::Ucs2 => b' ',
            };
        }
        let bytes = self.encode(text);
        let len = bytes.len().min(field.len());
        field[..len].copy_from_slice(&bytes[..len]);
    }
}

fn validate_iso_name(name: &str) -> Result<(), IsoError> {
    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || matches!(b, b'_' | b'.' | b';'));
    let valid = !name.is_empty()
        && name.len() <= MAX_ISO_NAME_LEN
        && valid_chars
        && name.matches('.').count() == 1
        && name
            .split_once(';')
            .is_some_and(|(_, version)| !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(IsoError::InvalidIsoName {
            name: name.to_owned(),
        })
    }
}

fn validate_joliet_name(name: &str) -> Result<(), IsoError> {
    let valid = !name.is_empty()
        && name.encode_utf16().count() <= MAX_JOLIET_NAME_LEN
        && !name
            .chars()
            .any(|c| matches!(c, '*' | '/' | ':' | ';' | '?' | '\\') || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(IsoError::InvalidJolietName {
            name: name.to_owned(),
        })
    }
}

fn record_len(id_len: usize) -> usize {
    33 + id_len + usize::from(id_len % 2 == 0)
}

fn directory_len(ids: &[Vec<u8>]) -> usize {
    let mut len = 0;
    for record in [1, 1].into_iter().chain(ids.iter().map(Vec::len)).map(record_len) {
        let used = len % SECTOR_SIZE;
        if used + record > SECTOR_SIZE {
            len += SECTOR_SIZE - used;
        }
        len += record;
    }
    sectors(len) as usize * SECTOR_SIZE
}

fn directory_record(extent: u32, size: u32, flags: u8, id: &[u8], time: &[u8; 7]) -> Vec<u8> {
    let len = record_len(id.len());
    let mut r = vec![0u8; len];
    r[0] = len as u8;
    r[2..10].copy_from_slice(&both_u32(extent));
    r[10..18].copy_from_slice(&both_u32(size));
    r[18..25].copy_from_slice(time);
    r[25] = flags;
    r[28..32].copy_from_slice(&both_u16(1));
    r[32] = id.len() as u8;
    r[33..33 + id.len()].copy_from_slice(id);
    r
}

fn path_table(root_sector: u32, big_endian: bool) -> Vec<u8> {
    let mut t = vec![0u8; PATH_TABLE_SIZE as usize];
    t[0] = 1; // identifier length
    if big_endian {
        t[2..6].copy_from_slice(&root_sector.to_be_bytes());
        t[6..8].copy_from_slice(&1u16.to_be_bytes());
    } else {
        t[2..6].copy_from_slice(&root_sector.to_le_bytes());
        t[6..8].copy_from_slice(&1u16.to_le_bytes());
    }
    t
}

fn terminator() -> Vec<u8> {
    let mut d = vec![0u8; SECTOR_SIZE];
    d[0] = DESCRIPTOR_TERMINATOR;
    d[1..6].copy_from_slice(STANDARD_ID);
    d[6] = 1;
    d
}

fn put_sector(image: &mut [u8], sector: u32, data: &[u8]) {
    let start = sector as usize * SECTOR_SIZE;
    image[start..start + data.len()].copy_from_slice(data);
}

fn sectors(len: usize) -> u32 {
    len.div_ceil(SECTOR_SIZE) as u32
}

fn both_u16(value: u16) -> [u8; 4] {
    let [l0, l1] = value.to_le_bytes();
    let [b0, b1] = value.to_be_bytes();
    [l0, l1, b0, b1]
}

fn both_u32(value: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&value.to_le_bytes());
    out[4..].copy_from_slice(&value.to_be_bytes());
    out
}
