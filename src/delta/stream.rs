//! delta::stream
//!
//! Whole-content delta sender.
//!
//! The commit builder never computes real deltas against the base text; it
//! transmits the full new content as a series of `New`-only windows, one per
//! [`DELTA_WINDOW_SIZE`] block, and reports the MD5 of everything sent so the
//! receiver can verify the reconstructed text.

use std::io::Read;

use super::window::{Instruction, Window};

/// Size of each transmitted block.
pub const DELTA_WINDOW_SIZE: usize = 102_400;

/// Lowercase hex MD5 of a buffer.
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Send the full contents of `reader` to `handler` as delta windows.
///
/// The handler receives one window per block and a final `None`. Returns the
/// hex MD5 digest of the full stream.
pub fn send_stream<R, E>(
    mut reader: R,
    mut handler: impl FnMut(Option<&Window>) -> Result<(), E>,
) -> Result<String, E>
where
    R: Read,
    E: From<std::io::Error>,
{
    let mut context = md5::Context::new();
    let mut block = vec![0u8; DELTA_WINDOW_SIZE];
    loop {
        let filled = read_block(&mut reader, &mut block)?;
        if filled == 0 {
            break;
        }
        let data = &block[..filled];
        context.consume(data);
        handler(Some(&Window::from_new_data(data.to_vec())))?;
        if filled < DELTA_WINDOW_SIZE {
            break;
        }
    }
    handler(None)?;
    Ok(format!("{:x}", context.compute()))
}

/// Windows turning `source` into `target`.
///
/// Each target block is paired with the source block at the same offset;
/// the common prefix of the two becomes a `Source` copy and the rest is
/// sent as new data. Cheap, and exact for the append and in-place edit
/// patterns that dominate real histories.
pub fn delta_windows(source: &[u8], target: &[u8]) -> Vec<Window> {
    let mut windows = Vec::new();
    for (index, chunk) in target.chunks(DELTA_WINDOW_SIZE).enumerate() {
        let offset = index * DELTA_WINDOW_SIZE;
        let sview: &[u8] = if offset < source.len() {
            let end = (offset + DELTA_WINDOW_SIZE).min(source.len());
            &source[offset..end]
        } else {
            &[]
        };
        let common = sview
            .iter()
            .zip(chunk)
            .take_while(|(a, b)| a == b)
            .count();
        if common == 0 {
            windows.push(Window::from_new_data(chunk.to_vec()));
            continue;
        }
        let mut ops = vec![Instruction::Source {
            offset: 0,
            len: common,
        }];
        let rest = &chunk[common..];
        if !rest.is_empty() {
            ops.push(Instruction::New { len: rest.len() });
        }
        windows.push(Window {
            sview_offset: offset as u64,
            sview_len: common,
            tview_len: chunk.len(),
            ops,
            new_data: rest.to_vec(),
        });
    }
    windows
}

/// Fill `block` as far as the reader allows.
fn read_block<R: Read>(reader: &mut R, block: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
