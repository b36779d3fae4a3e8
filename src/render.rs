//! Lays annotations over a fixed-width hex dump.

use colored::Color;

use crate::annotate::{Annotation, COLORS};

/// Bytes per dump row.
pub const BLOCK_SIZE: usize = 16;

/// Background colours, indexed by [`Annotation::color`]. Text is always white.
pub const PALETTE: [Color; COLORS] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
];

// Sequences are built here rather than through `ColoredString`, which consults
// the process-wide `SHOULD_COLORIZE` state and would make output depend on it.
const RESET: &str = "\x1b[0m";

/// Formats a buffer as `OFFSET|\tHEX\t\tLABEL` lines.
///
/// Each annotation's bytes are wrapped in a colour span and its label is put on
/// the row holding its first byte, or the next free row below it when that row
/// already carries a label. Overlapping annotations are not resolved; later
/// spans are clipped so every byte is still printed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderer {
    styled: bool,
}
impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
impl Renderer {
    /// A renderer emitting terminal colour sequences.
    pub fn new() -> Self {
        Self { styled: true }
    }
    /// A renderer emitting bare text.
    pub fn plain() -> Self {
        Self { styled: false }
    }

    pub fn render(self, data: &[u8], annotations: &[Annotation]) -> String {
        let mut rows: Vec<String> = data.chunks(BLOCK_SIZE)
            .enumerate()
            .map(|(row, block)| self.hex_row(row * BLOCK_SIZE, block, annotations))
            .collect();
        let labels = self.label_rows(rows.len(), annotations);
        if labels.len() > rows.len() {
            rows.resize(labels.len(), String::new());
        }

        let mut output = String::new();
        for (row, hex) in rows.iter().enumerate() {
            let label = labels.get(row).and_then(Option::as_deref).unwrap_or_default();
            output.push_str(&format!("{:08x}|\t{hex}\t\t{label}\n", row * BLOCK_SIZE));
        }
        output
    }

    fn hex_row(self, base: usize, block: &[u8], annotations: &[Annotation]) -> String {
        let tokens: Vec<String> = block.iter().map(|byte| format!("{byte:02x}")).collect();
        let end = base + block.len();

        let mut spans: Vec<(usize, usize, usize)> = annotations.iter()
            .filter_map(|annotation| {
                let start = annotation.start.max(base);
                let stop = annotation.end.min(end);
                (start < stop).then(|| (start - base, stop - base, annotation.color))
            })
            .collect();
        spans.sort_by_key(|&(start, ..)| start);

        let mut parts = Vec::with_capacity(tokens.len());
        let mut cursor = 0;
        for (start, stop, color) in spans {
            let start = start.max(cursor);
            if start >= stop {
                continue
            }
            parts.extend_from_slice(&tokens[cursor..start]);
            parts.push(self.paint(&tokens[start..stop].join(" "), color));
            cursor = stop;
        }
        parts.extend_from_slice(&tokens[cursor..]);
        parts.join(" ")
    }

    fn label_rows(self, rows: usize, annotations: &[Annotation]) -> Vec<Option<String>> {
        let mut labels: Vec<Option<String>> = vec![None; rows];
        for annotation in annotations {
            let mut row = annotation.start / BLOCK_SIZE;
            while labels.get(row).map_or(false, Option::is_some) {
                row += 1;
            }
            if row >= labels.len() {
                labels.resize(row + 1, None);
            }
            labels[row] = Some(self.paint(&annotation.label, annotation.color));
        }
        labels
    }

    fn paint(self, text: &str, color: usize) -> String {
        if self.styled {
            format!("{}{text}{RESET}", style(color))
        } else {
            text.to_owned()
        }
    }
}

/// The escape sequence opening a span in colour slot `color`.
pub(crate) fn style(color: usize) -> String {
    format!("\x1b[{};{}m", Color::White.to_fg_str(), PALETTE[color % COLORS].to_bg_str())
}

/// Render `data` with colour using [`Renderer::new`].
pub fn render(data: &[u8], annotations: &[Annotation]) -> String {
    Renderer::new().render(data, annotations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(text: &str) -> String {
        let mut plain = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                chars.by_ref().find(|&c| c == 'm');
            } else {
                plain.push(c);
            }
        }
        plain
    }

    fn span(color: usize, text: &str) -> String {
        format!("{}{text}{RESET}", style(color))
    }

    #[test]
    fn empty_buffer() {
        assert_eq!(render(&[], &[]), "");
    }

    #[test]
    fn style_sequence() {
        assert_eq!(style(0), "\x1b[37;41m");
        assert_eq!(style(5), "\x1b[37;46m");
        assert_eq!(style(6), style(0));
    }

    #[test]
    fn styling_ignores_colored_override() {
        let data = [0x7f];
        let annotations = [Annotation::new(0, 1, "x", 0)];
        colored::control::set_override(false);
        let dump = render(&data, &annotations);
        colored::control::unset_override();
        assert_eq!(dump, format!("00000000|\t{}\t\t{}\n", span(0, "7f"), span(0, "x")));
    }

    #[test]
    fn plain_rows() {
        let data: Vec<u8> = (0..20).collect();
        let dump = Renderer::plain().render(&data, &[]);
        assert_eq!(dump, concat!(
            "00000000|\t00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\t\t\n",
            "00000010|\t10 11 12 13\t\t\n",
        ));
    }

    #[test]
    fn magic_row() {
        let data = [0x7f, 0x45, 0x4c, 0x46];
        let annotations = [Annotation::new(0, 4, "Magic Number: \\x7fELF", 0)];
        let dump = render(&data, &annotations);
        assert_eq!(dump, format!(
            "00000000|\t{}\t\t{}\n",
            span(0, "7f 45 4c 46"),
            span(0, "Magic Number: \\x7fELF"),
        ));
    }

    #[test]
    fn spans_inside_a_row() {
        let data = [0u8; 8];
        let annotations = [
            Annotation::new(1, 3, "a", 2),
            Annotation::new(5, 6, "b", 3),
        ];
        let dump = render(&data, &annotations);
        let hex = dump.lines().next().unwrap().split('\t').nth(1).unwrap();
        assert_eq!(hex, format!("00 {} 00 00 {} 00 00", span(2, "00 00"), span(3, "00")));
    }

    #[test]
    fn span_across_rows() {
        let data: Vec<u8> = (0..32).collect();
        let annotations = [Annotation::new(14, 18, "across", 1)];
        let dump = render(&data, &annotations);
        let lines: Vec<&str> = dump.lines().collect();
        assert!(lines[0].contains(&format!("0d {}\t\t", span(1, "0e 0f"))));
        assert!(lines[1].starts_with(&format!("00000010|\t{} 12", span(1, "10 11"))));
    }

    #[test]
    fn labels_waterfall() {
        let data = [0x7f, 0x45, 0x4c, 0x46, 0x02];
        let annotations = [
            Annotation::new(0, 4, "first", 0),
            Annotation::new(4, 5, "second", 1),
        ];
        let dump = Renderer::plain().render(&data, &annotations);
        assert_eq!(dump, concat!(
            "00000000|\t7f 45 4c 46 02\t\tfirst\n",
            "00000010|\t\t\tsecond\n",
        ));
    }

    #[test]
    fn labels_skip_occupied_rows() {
        let data = [0u8; 20];
        let annotations = [
            Annotation::new(0, 1, "a", 0),
            Annotation::new(1, 2, "b", 1),
            Annotation::new(16, 17, "c", 2),
        ];
        let dump = Renderer::plain().render(&data, &annotations);
        let labels: Vec<&str> = dump.lines().map(|line| line.rsplit('\t').next().unwrap()).collect();
        assert_eq!(labels, ["a", "b", "c"]);
    }

    #[test]
    fn overlapping_spans_keep_every_byte() {
        let data: Vec<u8> = (0..16).collect();
        let annotations = [
            Annotation::new(0, 8, "wide", 0),
            Annotation::new(4, 12, "overlap", 1),
        ];
        let dump = render(&data, &annotations);
        let first = strip(dump.lines().next().unwrap());
        assert!(first.starts_with("00000000|\t00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\t\t"));
    }

    #[test]
    fn hex_round_trips() {
        let data: Vec<u8> = (0..=255u8).rev().chain(0..7).collect();
        let annotations = [
            Annotation::new(3, 40, "x", 0),
            Annotation::new(100, 101, "y", 1),
            Annotation::new(250, 262, "z", 2),
        ];
        let dump = render(&data, &annotations);
        let digits: String = dump.lines()
            .map(|line| strip(line.split('\t').nth(1).unwrap()))
            .collect::<String>()
            .split_whitespace()
            .collect();
        let bytes: Vec<u8> = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).unwrap())
            .collect();
        assert_eq!(bytes, data);
    }
}
