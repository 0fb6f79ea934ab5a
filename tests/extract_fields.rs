mod common;

use common::{date, detail_html, listing_html, row, row_with, Action};
use ecourts_capture::extract::{
    case_detail, cnr_number, document_links, hearing_date, labeled_field, listing_rows,
    mentions_label, page_text, UNKNOWN_COURT,
};
use ecourts_capture::model::CaseDetail;

#[test]
fn cnr_prefers_the_annotated_token() {
    let text = "Ref ZZZZZZZZZZZZZZZZ CNR Number AB12CD34EF56GH78 (Note the CNR number for future reference)";
    assert_eq!(cnr_number(text).as_deref(), Some("AB12CD34EF56GH78"));
}

#[test]
fn cnr_falls_back_to_any_sixteen_character_token() {
    assert_eq!(
        cnr_number("CNR: DLHC010012342024 listed").as_deref(),
        Some("DLHC010012342024")
    );
    assert_eq!(cnr_number("no such token here, only ABC123"), None);
    assert_eq!(cnr_number("DLHC0100123420245 is seventeen"), None);
}

#[test]
fn labeled_fields_do_not_depend_on_order() {
    let a = "Case Type: CS - Civil Suit Filing Number: 123/2024 Registration Number: 456/2024";
    let b = "Registration Number: 456/2024 Filing Number: 123/2024 Case Type: CS - Civil Suit";
    for text in [a, b] {
        assert_eq!(labeled_field(text, "Case Type").as_deref(), Some("CS - Civil Suit"));
        assert_eq!(labeled_field(text, "Filing Number").as_deref(), Some("123/2024"));
        assert_eq!(labeled_field(text, "Registration Number").as_deref(), Some("456/2024"));
    }
}

#[test]
fn missing_label_leaves_field_empty() {
    let detail = case_detail("Case Type: Civil Suit");
    assert_eq!(detail.case_type.as_deref(), Some("Civil Suit"));
    assert_eq!(detail.filing_number, None);
    assert_eq!(detail.court_and_judge, None);
    assert_eq!(case_detail(""), CaseDetail::default());
    assert!(case_detail("").is_empty());
}

#[test]
fn label_matching_is_case_insensitive_and_tolerates_spacing() {
    let text = "FILING   NUMBER - 77/2023";
    assert_eq!(labeled_field(text, "Filing Number").as_deref(), Some("77/2023"));
}

#[test]
fn detail_page_extraction() {
    let html = detail_html("12", &[], true);
    let text = page_text(&html);
    assert!(!text.contains("Criminal"), "script text leaked: {text}");

    let detail = case_detail(&text);
    assert_eq!(detail.cnr_number.as_deref(), Some("DLHC010000000012"));
    assert_eq!(detail.case_type.as_deref(), Some("CS - Civil Suit"));
    assert_eq!(detail.filing_number.as_deref(), Some("12/2024"));
    assert_eq!(detail.registration_number.as_deref(), Some("R12/2024"));
    assert_eq!(detail.court_and_judge.as_deref(), Some("2-District Judge"));
}

#[test]
fn page_text_normalises_compatibility_characters() {
    let text = page_text("<p>Filing\u{00A0}Number</p><p>\u{FF11}\u{FF12}/2024</p>");
    assert_eq!(text, "Filing Number 12/2024");
}

#[test]
fn hearing_date_after_label() {
    assert_eq!(
        hearing_date("3 CS/3/2024 Next Hearing Date: 15-03-2024 View"),
        Some(date(2024, 3, 15))
    );
    assert_eq!(hearing_date("NextDate 5 March 2024"), Some(date(2024, 3, 5)));
    assert_eq!(hearing_date("Next Date - 15/03/24"), Some(date(2024, 3, 15)));
}

#[test]
fn hearing_date_fallback_needs_the_word_next() {
    assert_eq!(
        hearing_date("Next on 15/03/2024 before court 2"),
        Some(date(2024, 3, 15))
    );
    assert_eq!(hearing_date("Filed 01/02/2024"), None);
    assert_eq!(hearing_date("Next Hearing Date: to be fixed"), None);
}

#[test]
fn listing_rows_skip_header_and_carry_court_name() {
    let html = listing_html(&[
        row("1", date(2024, 3, 15)),
        row_with("2", date(2024, 3, 16), Action::Missing),
    ]);
    let rows = listing_rows(&html);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].serial, "1");
    assert_eq!(rows[0].columns[1], "CS/1/2024");
    assert_eq!(rows[0].court_name, "District Court, Saket");
    assert_eq!(rows[0].next_hearing_date, Some(date(2024, 3, 15)));
    assert_eq!(rows[1].next_hearing_date, Some(date(2024, 3, 16)));
}

#[test]
fn listing_rows_without_serial_or_heading() {
    let html = "<table><tr><th>Sr</th></tr><tr><td></td><td>Court adjourned</td></tr>\
                <tr><td>4</td><td>Next Hearing Date: 01/04/2024</td></tr></table>";
    let rows = listing_rows(html);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].serial, "4");
    assert_eq!(rows[0].court_name, UNKNOWN_COURT);

    assert!(listing_rows("<p>No records found</p>").is_empty());
}

#[test]
fn document_links_resolve_and_dedupe() {
    let html = r#"<a href="/docs/order.pdf">Order</a>
        <a href="https://cdn.test/judgment.PDF">Judgment</a>
        <a href="/docs/order.pdf">Order again</a>
        <a href="/docs/notes.html">Notes</a>"#;
    assert_eq!(
        document_links(html, "https://portal.test/case/1"),
        vec![
            "https://portal.test/docs/order.pdf".to_string(),
            "https://cdn.test/judgment.PDF".to_string(),
        ]
    );
    assert_eq!(
        document_links(html, ""),
        vec!["https://cdn.test/judgment.PDF".to_string()]
    );
}

#[test]
fn labels_match_whole_tokens_only() {
    assert!(mentions_label("1 CS/1/2024 View", "1"));
    assert!(mentions_label("Sr 12.", "12"));
    assert!(!mentions_label("11 CS/11/2021 View", "1"));
    assert!(!mentions_label("anything", "  "));
}
