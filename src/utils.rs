/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    let mut rendered = String::with_capacity(bytes.len().saturating_mul(3));
    for (index, value) in bytes.iter().enumerate() {
        if index > 0 {
            rendered.push(' ');
        }
        rendered.push(nibble_to_hex(value >> 4));
        rendered.push(nibble_to_hex(value & 0x0F));
    }
    rendered
}

/// Names a bank the way the bootloader documentation does.
pub(crate) fn bank_label(bank: u8) -> String {
    match bank {
        0 => "A".to_string(),
        1 => "B".to_string(),
        other => format!("#{other}"),
    }
}

fn nibble_to_hex(value: u8) -> char {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    HEX[usize::from(value)] as char
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("<empty>", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_uppercase_pairs() {
        assert_eq!("05 00 A1 FF", format_hex(&[0x05, 0x00, 0xA1, 0xFF]));
    }

    #[rstest]
    #[case::bank_a(0, "A")]
    #[case::bank_b(1, "B")]
    #[case::out_of_range(7, "#7")]
    fn bank_label_names_banks(#[case] bank: u8, #[case] expected: &str) {
        assert_eq!(expected, bank_label(bank));
    }
}
