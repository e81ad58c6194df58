//! Chinese numeral ordinals in section titles
//!
//! Generated chapters arrive titled `一、...`, `二、...`, `十一、...`. These
//! helpers rank titles by that leading numeral so generated siblings can be
//! put back into reading order.

use std::cmp::Ordering;

fn digit(c: char) -> Option<u32> {
    match c {
        '零' => Some(0),
        '一' => Some(1),
        '二' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        '十' => Some(10),
        _ => None,
    }
}

/// Rank of a title's leading numeral (`一` = 1 .. `十九` = 19)
///
/// Returns `None` when the title does not start with a numeral.
#[must_use]
pub fn ordinal_rank(title: &str) -> Option<u32> {
    let mut chars = title.chars();
    let first = chars.next()?;
    if first == '十' {
        return match chars.next().and_then(digit) {
            Some(unit) if unit < 10 => Some(10 + unit),
            _ => Some(10),
        };
    }
    digit(first)
}

/// Compare two titles by numeral rank
///
/// Numbered titles come first in numeral order; unnumbered titles compare
/// equal to each other so a stable sort keeps their existing order.
#[must_use]
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    match (ordinal_rank(a), ordinal_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_digit_numerals() {
        assert_eq!(ordinal_rank("一、總則"), Some(1));
        assert_eq!(ordinal_rank("九、附錄"), Some(9));
    }

    #[test]
    fn teens_and_ten() {
        assert_eq!(ordinal_rank("十、其他"), Some(10));
        assert_eq!(ordinal_rank("十一、補充"), Some(11));
        assert_eq!(ordinal_rank("十九"), Some(19));
    }

    #[test]
    fn no_numeral() {
        assert_eq!(ordinal_rank("Overview"), None);
        assert_eq!(ordinal_rank(""), None);
    }

    #[test]
    fn numbered_titles_sort_before_plain_ones() {
        let mut titles = vec!["附件", "三、管理", "一、背景", "說明", "十二、結論"];
        titles.sort_by(|a, b| compare_titles(a, b));
        assert_eq!(titles, vec!["一、背景", "三、管理", "十二、結論", "附件", "說明"]);
    }
}
