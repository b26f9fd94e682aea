//! Hex + ASCII dump of raw frames for trace logging.

const BYTES_PER_LINE: usize = 16;

/// Classic offset / hex / printable layout, one line per 16 bytes:
///
/// ```text
/// 00000000:  02 30 31 30 30 30 30 31  32 35 30 30 31 30 39 37   |.0100001250010978|
/// ```
pub fn hexdump(data: &[u8]) -> String {
    data.chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut hex = chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            // Gap between the two halves of a line.
            if hex.len() > 24 {
                hex.insert(24, ' ');
            }
            let printable: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!(
                "{:08x}:  {:<width$}  |{}|",
                i * BYTES_PER_LINE,
                hex,
                printable,
                width = BYTES_PER_LINE * 3
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
