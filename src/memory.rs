use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const BANK_SIZE: usize = 256;
pub const BANK_COUNT: usize = 256;
/// Extension of compiled bank files: `<stem>.<index>.cellprg`.
pub const BANK_FILE_EXT: &str = "cellprg";

pub type Bank = [u8; BANK_SIZE];

/// Assembler output: up to 256 banks, each holding at most 256 bytes.
///
/// Banks are stored unpadded; trailing space a program never reached is not
/// present. The bytes only make sense together with the instruction registry
/// that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBankSet")]
pub struct BankSet {
    banks: Vec<Option<Vec<u8>>>,
}

/// Unchecked wire form of [`BankSet`].
#[derive(Deserialize)]
struct RawBankSet {
    banks: Vec<Option<Vec<u8>>>,
}

impl TryFrom<RawBankSet> for BankSet {
    type Error = anyhow::Error;

    /// Pads to 256 slots; rejects extra slots and oversized banks.
    fn try_from(raw: RawBankSet) -> Result<Self> {
        anyhow::ensure!(
            raw.banks.len() <= BANK_COUNT,
            "{} bank slots, the limit is {BANK_COUNT}",
            raw.banks.len()
        );
        let mut set = Self::new();
        for (index, bank) in raw.banks.into_iter().enumerate() {
            if let Some(bytes) = bank {
                set.insert(index as u8, bytes)?;
            }
        }
        Ok(set)
    }
}

impl Default for BankSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BankSet {
    pub fn new() -> Self {
        Self {
            banks: vec![None; BANK_COUNT],
        }
    }

    pub fn insert(&mut self, index: u8, bytes: Vec<u8>) -> Result<Option<Vec<u8>>> {
        anyhow::ensure!(
            bytes.len() <= BANK_SIZE,
            "bank {index} holds {} bytes, the limit is {BANK_SIZE}",
            bytes.len()
        );
        Ok(self.banks[index as usize].replace(bytes))
    }

    pub fn get(&self, index: u8) -> Option<&[u8]> {
        self.banks[index as usize].as_deref()
    }

    /// Present banks in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.banks
            .iter()
            .enumerate()
            .filter_map(|(i, bank)| bank.as_deref().map(|bytes| (i as u8, bytes)))
    }

    pub fn len(&self) -> usize {
        self.banks.iter().filter(|bank| bank.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn file_name(stem: &str, index: u8) -> String {
        format!("{stem}.{index}.{BANK_FILE_EXT}")
    }

    /// Writes one file per present bank into `dir`.
    pub fn save(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        let mut written = Vec::new();
        for (index, bytes) in self.iter() {
            let path = dir.join(Self::file_name(stem, index));
            std::fs::write(&path, bytes)
                .with_context(|| format!("writing bank {index} to {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }

    /// Reads every `<stem>.<index>.cellprg` file found in `dir`.
    pub fn load(dir: &Path, stem: &str) -> Result<Self> {
        let mut set = Self::new();
        for index in 0..=u8::MAX {
            let path = dir.join(Self::file_name(stem, index));
            if !path.is_file() {
                continue;
            }
            let bytes =
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            set.insert(index, bytes)
                .with_context(|| format!("loading {}", path.display()))?;
        }
        Ok(set)
    }
}

/// A processor's banked memory: 256 slots, each absent or a full 256-byte bank.
#[derive(Clone)]
pub struct Memory {
    banks: Vec<Option<Box<Bank>>>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            banks: vec![None; BANK_COUNT],
        }
    }

    /// Replaces all banks with zero-padded copies of `set`.
    pub fn load(&mut self, set: &BankSet) {
        for slot in self.banks.iter_mut() {
            *slot = None;
        }
        for (index, bytes) in set.iter() {
            let mut bank = Box::new([0u8; BANK_SIZE]);
            bank[..bytes.len()].copy_from_slice(bytes);
            self.banks[index as usize] = Some(bank);
        }
    }

    pub fn is_present(&self, bank: u8) -> bool {
        self.banks[bank as usize].is_some()
    }

    pub fn bank(&self, bank: u8) -> Option<&Bank> {
        self.banks[bank as usize].as_deref()
    }

    /// Absent banks read as zero and are not allocated.
    pub fn read(&self, bank: u8, offset: u8) -> u8 {
        self.bank(bank).map_or(0, |b| b[offset as usize])
    }

    /// Allocates a zero-filled bank on first write.
    pub fn write(&mut self, bank: u8, offset: u8, value: u8) {
        let slot = self.banks[bank as usize].get_or_insert_with(|| Box::new([0u8; BANK_SIZE]));
        slot[offset as usize] = value;
    }

    /// Indices of banks currently allocated.
    pub fn resident(&self) -> impl Iterator<Item = u8> + '_ {
        self.banks
            .iter()
            .enumerate()
            .filter(|(_, bank)| bank.is_some())
            .map(|(i, _)| i as u8)
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("resident", &self.resident().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_set_rejects_oversized_banks() {
        let mut set = BankSet::new();
        assert!(set.insert(3, vec![0; 256]).is_ok());
        assert!(set.insert(4, vec![0; 257]).is_err());
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn bank_files_round_trip_through_disk() {
        let dir = std::env::temp_dir().join(format!("cellvm-banks-{}", std::process::id()));
        let mut set = BankSet::new();
        set.insert(0, vec![7, 42]).unwrap();
        set.insert(200, vec![1]).unwrap();
        let written = set.save(&dir, "prog").unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.join("prog.200.cellprg").is_file());
        let loaded = BankSet::load(&dir, "prog").unwrap();
        assert_eq!(loaded, set);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn deserialized_bank_sets_keep_their_limits() {
        let oversized = format!("{{\"banks\":[{:?}]}}", vec![0u8; 300]);
        assert!(serde_json::from_str::<BankSet>(&oversized).is_err());
        let too_many = format!("{{\"banks\":{:?}}}", vec![None::<u8>; 257])
            .replace("None", "null");
        assert!(serde_json::from_str::<BankSet>(&too_many).is_err());

        let empty: BankSet = serde_json::from_str(r#"{"banks":[]}"#).unwrap();
        assert_eq!(empty.get(5), None);
        assert!(empty.is_empty());

        let mut set = BankSet::new();
        set.insert(4, vec![1, 2]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        let back: BankSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        let mut mem = Memory::new();
        mem.load(&back);
        assert_eq!(mem.read(4, 1), 2);
    }

    #[test]
    fn load_pads_and_reads_absent_as_zero() {
        let mut set = BankSet::new();
        set.insert(1, vec![9, 8]).unwrap();
        let mut mem = Memory::new();
        mem.load(&set);
        assert_eq!(mem.read(1, 1), 8);
        assert_eq!(mem.read(1, 255), 0);
        assert_eq!(mem.read(2, 0), 0);
        assert!(!mem.is_present(2));
        mem.write(2, 5, 1);
        assert!(mem.is_present(2));
        assert_eq!(mem.resident().collect::<Vec<_>>(), vec![1, 2]);
    }
}
