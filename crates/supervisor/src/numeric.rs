//! Conversions from engine-native big-endian integers to wire strings.

/// Renders a big-endian unsigned integer of any width in base 10.
pub fn to_decimal(bytes: &[u8]) -> String {
	let mut value: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
	if value.is_empty() {
		return "0".to_string();
	}

	let mut digits = Vec::new();
	while !value.is_empty() {
		let mut remainder = 0u32;
		let mut quotient = Vec::with_capacity(value.len());
		for byte in &value {
			let acc = (remainder << 8) | u32::from(*byte);
			let digit = (acc / 10) as u8;
			remainder = acc % 10;
			if !quotient.is_empty() || digit != 0 {
				quotient.push(digit);
			}
		}
		digits.push(char::from(b'0' + remainder as u8));
		value = quotient;
	}
	digits.iter().rev().collect()
}

/// `0x`-prefixed lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}
