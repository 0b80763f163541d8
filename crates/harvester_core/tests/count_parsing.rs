use harvester_core::parse_count;
use pretty_assertions::assert_eq;

#[test]
fn parses_suffixes_and_thousands_separators() {
    assert_eq!(parse_count("1.2K"), 1_200);
    assert_eq!(parse_count("3,400"), 3_400);
    assert_eq!(parse_count("2M"), 2_000_000);
    assert_eq!(parse_count(""), 0);
}

#[test]
fn suffix_is_case_insensitive_and_may_follow_a_space() {
    assert_eq!(parse_count("4k"), 4_000);
    assert_eq!(parse_count("1.5 b"), 1_500_000_000);
    assert_eq!(parse_count("7.25m views"), 7_250_000);
}

#[test]
fn comma_before_suffix_is_a_decimal_point() {
    assert_eq!(parse_count("1,5K"), 1_500);
    assert_eq!(parse_count("12,3 B"), 12_300_000_000);
}

#[test]
fn dotted_thousands_without_suffix() {
    assert_eq!(parse_count("1.234 beğeni"), 1_234);
    assert_eq!(parse_count("12.345.678"), 12_345_678);
    assert_eq!(parse_count("1,234,567 likes"), 1_234_567);
}

#[test]
fn mixed_separators_use_last_as_decimal() {
    assert_eq!(parse_count("1.234,6"), 1_235);
    assert_eq!(parse_count("1,234.4"), 1_234);
}

#[test]
fn words_starting_with_suffix_letters_are_not_magnitudes() {
    assert_eq!(parse_count("5 books"), 5);
    assert_eq!(parse_count("12 boosts"), 12);
    assert_eq!(parse_count("3 Likes"), 3);
}

#[test]
fn reads_first_number_inside_labels() {
    assert_eq!(parse_count("Liked by 2,048 people"), 2_048);
    assert_eq!(parse_count("38 Replies. Reply"), 38);
    assert_eq!(parse_count("\u{a0}9\u{a0}K"), 9_000);
}

#[test]
fn rounds_to_nearest_integer() {
    assert_eq!(parse_count("12.5"), 13);
    assert_eq!(parse_count("0.0004K"), 0);
}

#[test]
fn unparsable_input_is_zero() {
    assert_eq!(parse_count("likes"), 0);
    assert_eq!(parse_count("K"), 0);
    assert_eq!(parse_count("   "), 0);
}

#[test]
fn no_break_spaces_group_thousands() {
    assert_eq!(parse_count("1\u{a0}234"), 1_234);
    assert_eq!(parse_count("12\u{a0}345\u{a0}678 mentions J'aime"), 12_345_678);
    assert_eq!(parse_count("1\u{202f}234"), 1_234);
    assert_eq!(parse_count("1\u{a0}234,5"), 1_235);
    assert_eq!(parse_count("3,4\u{a0}k"), 3_400);
}
