//! Packed 32-bit token attributes
//!
//! ```text
//! bits  0-7   language id
//! bits  8-9   standard token type
//! bit   10    contains balanced brackets
//! bits 11-14  font style
//! bits 15-23  foreground color id
//! bits 24-31  background color id
//! ```

use bitflags::bitflags;

bitflags! {
    #[derive(Default, Clone, Copy, Eq, PartialEq, Hash, Debug)]
    pub struct FontStyle: u32 {
        const ITALIC = 1;
        const BOLD = 2;
        const UNDERLINE = 4;
        const STRIKETHROUGH = 8;
    }
}

impl FontStyle {
    /// Parse a theme `fontStyle` string such as `"italic bold"`
    pub fn parse(value: &str) -> Self {
        value
            .split(' ')
            .fold(FontStyle::empty(), |style, segment| match segment {
                "italic" => style | FontStyle::ITALIC,
                "bold" => style | FontStyle::BOLD,
                "underline" => style | FontStyle::UNDERLINE,
                "strikethrough" => style | FontStyle::STRIKETHROUGH,
                _ => style,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StandardTokenType {
    #[default]
    Other = 0,
    Comment = 1,
    String = 2,
    RegEx = 3,
}

impl StandardTokenType {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            1 => StandardTokenType::Comment,
            2 => StandardTokenType::String,
            3 => StandardTokenType::RegEx,
            _ => StandardTokenType::Other,
        }
    }
}

const LANGUAGE_ID_MASK: u32 = 0x0000_00FF;
const TOKEN_TYPE_MASK: u32 = 0x0000_0300;
const BALANCED_BRACKETS_MASK: u32 = 0x0000_0400;
const FONT_STYLE_MASK: u32 = 0x0000_7800;
const FOREGROUND_MASK: u32 = 0x00FF_8000;
const BACKGROUND_MASK: u32 = 0xFF00_0000;

const LANGUAGE_ID_OFFSET: u32 = 0;
const TOKEN_TYPE_OFFSET: u32 = 8;
const BALANCED_BRACKETS_OFFSET: u32 = 10;
const FONT_STYLE_OFFSET: u32 = 11;
const FOREGROUND_OFFSET: u32 = 15;
const BACKGROUND_OFFSET: u32 = 24;

pub fn language_id(encoded: u32) -> u32 {
    (encoded & LANGUAGE_ID_MASK) >> LANGUAGE_ID_OFFSET
}

pub fn token_type(encoded: u32) -> StandardTokenType {
    StandardTokenType::from_bits((encoded & TOKEN_TYPE_MASK) >> TOKEN_TYPE_OFFSET)
}

pub fn contains_balanced_brackets(encoded: u32) -> bool {
    encoded & BALANCED_BRACKETS_MASK != 0
}

pub fn font_style(encoded: u32) -> FontStyle {
    FontStyle::from_bits_truncate((encoded & FONT_STYLE_MASK) >> FONT_STYLE_OFFSET)
}

pub fn foreground(encoded: u32) -> u32 {
    (encoded & FOREGROUND_MASK) >> FOREGROUND_OFFSET
}

pub fn background(encoded: u32) -> u32 {
    (encoded & BACKGROUND_MASK) >> BACKGROUND_OFFSET
}

/// Overwrite the given fields of `encoded`
///
/// A language id or color of `0` and a `None` keep the existing value.
pub fn set(
    encoded: u32,
    language_id_value: u32,
    token_type_value: Option<StandardTokenType>,
    balanced_brackets: Option<bool>,
    font_style_value: Option<FontStyle>,
    foreground_value: u32,
    background_value: u32,
) -> u32 {
    let language_id_value = if language_id_value == 0 {
        language_id(encoded)
    } else {
        language_id_value
    };
    let token_type_value = token_type_value.unwrap_or_else(|| token_type(encoded));
    let balanced_brackets = balanced_brackets.unwrap_or_else(|| contains_balanced_brackets(encoded));
    let font_style_value = font_style_value.unwrap_or_else(|| font_style(encoded));
    let foreground_value = if foreground_value == 0 {
        foreground(encoded)
    } else {
        foreground_value
    };
    let background_value = if background_value == 0 {
        background(encoded)
    } else {
        background_value
    };

    ((language_id_value << LANGUAGE_ID_OFFSET) & LANGUAGE_ID_MASK)
        | (((token_type_value as u32) << TOKEN_TYPE_OFFSET) & TOKEN_TYPE_MASK)
        | ((u32::from(balanced_brackets) << BALANCED_BRACKETS_OFFSET) & BALANCED_BRACKETS_MASK)
        | ((font_style_value.bits() << FONT_STYLE_OFFSET) & FONT_STYLE_MASK)
        | ((foreground_value << FOREGROUND_OFFSET) & FOREGROUND_MASK)
        | ((background_value << BACKGROUND_OFFSET) & BACKGROUND_MASK)
}

/// Debug rendering, most significant bit first
pub fn to_binary_str(encoded: u32) -> String {
    format!("{:032b}", encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_read_back_every_field() {
        let encoded = set(
            0,
            5,
            Some(StandardTokenType::RegEx),
            Some(true),
            Some(FontStyle::BOLD | FontStyle::UNDERLINE),
            101,
            102,
        );
        assert_eq!(language_id(encoded), 5);
        assert_eq!(token_type(encoded), StandardTokenType::RegEx);
        assert!(contains_balanced_brackets(encoded));
        assert_eq!(font_style(encoded), FontStyle::BOLD | FontStyle::UNDERLINE);
        assert_eq!(foreground(encoded), 101);
        assert_eq!(background(encoded), 102);
    }

    #[test]
    fn test_zero_and_none_keep_existing_values() {
        let encoded = set(
            0,
            1,
            Some(StandardTokenType::String),
            Some(true),
            Some(FontStyle::ITALIC),
            3,
            4,
        );
        let updated = set(encoded, 0, None, None, None, 0, 9);
        assert_eq!(language_id(updated), 1);
        assert_eq!(token_type(updated), StandardTokenType::String);
        assert!(contains_balanced_brackets(updated));
        assert_eq!(font_style(updated), FontStyle::ITALIC);
        assert_eq!(foreground(updated), 3);
        assert_eq!(background(updated), 9);
    }

    #[test]
    fn test_explicit_empty_font_style_clears() {
        let encoded = set(0, 0, None, None, Some(FontStyle::BOLD), 0, 0);
        let cleared = set(encoded, 0, None, None, Some(FontStyle::empty()), 0, 0);
        assert_eq!(font_style(cleared), FontStyle::empty());
    }

    #[test]
    fn test_max_color_ids_fit() {
        let encoded = set(0, 255, None, None, None, 511, 255);
        assert_eq!(language_id(encoded), 255);
        assert_eq!(foreground(encoded), 511);
        assert_eq!(background(encoded), 255);
    }

    #[test]
    fn test_parse_font_style() {
        assert_eq!(
            FontStyle::parse("italic bold"),
            FontStyle::ITALIC | FontStyle::BOLD
        );
        assert_eq!(FontStyle::parse("underline strikethrough").bits(), 12);
        assert_eq!(FontStyle::parse(""), FontStyle::empty());
    }

    #[test]
    fn test_binary_str() {
        assert_eq!(to_binary_str(1).len(), 32);
        assert!(to_binary_str(1).ends_with('1'));
    }
}
