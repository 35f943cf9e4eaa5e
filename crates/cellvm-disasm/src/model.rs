use anyhow::Result;
use std::path::Path;

use cellvm_rs::memory::{BankSet, BANK_FILE_EXT};

/// A compiled program as found on disk: the banks of one stem.
#[derive(Debug, Clone)]
pub struct Image {
    pub stem: String,
    pub banks: BankSet,
}

impl Image {
    pub fn has_bank(&self, bank: u8) -> bool {
        self.banks.get(bank).is_some()
    }

    /// Stored length of a bank; the processor pads the rest with zeros.
    pub fn bank_len(&self, bank: u8) -> Option<usize> {
        self.banks.get(bank).map(|b| b.len())
    }
}

pub fn load_dir(dir: &Path, stem: &str) -> Result<Image> {
    let banks = BankSet::load(dir, stem)?;
    anyhow::ensure!(
        !banks.is_empty(),
        "no {stem}.*.{BANK_FILE_EXT} files in {}",
        dir.display()
    );
    Ok(Image { stem: stem.to_string(), banks })
}

/// Byte at `offset` of `bank`, if the bank is present and stores that many bytes.
pub fn read_u8(img: &Image, bank: u8, offset: u8) -> Option<u8> {
    img.banks.get(bank)?.get(offset as usize).copied()
}
