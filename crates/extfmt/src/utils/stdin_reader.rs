use std::io::Read;

use anyhow::Context;
use anyhow::Result;

#[cfg(test)]
pub use tests::TestStdInReader;

/// Source of the text piped to `stdin-fmt`.
pub trait StdInReader: Clone + Send + Sync {
  fn read_bytes(&self) -> Result<Vec<u8>>;

  /// Reads everything piped in, which formatters require to be UTF-8.
  fn read_text(&self) -> Result<String> {
    let bytes = self.read_bytes()?;
    String::from_utf8(bytes).context("Text provided on stdin was not valid UTF-8.")
  }
}

#[derive(Default, Clone, Copy)]
pub struct RealStdInReader;

impl StdInReader for RealStdInReader {
  fn read_bytes(&self) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    std::io::stdin().lock().read_to_end(&mut bytes).context("Error reading stdin.")?;
    Ok(bytes)
  }
}
