use crate::model::ListingRow;
use time::Date;

/// Rows whose next hearing falls on `today` or the day after, in input order.
/// Rows without a parsed date are dropped.
pub fn in_scope(rows: &[ListingRow], today: Date) -> Vec<ListingRow> {
    let tomorrow = today.next_day();
    rows.iter()
        .filter(|row| match row.next_hearing_date {
            Some(d) => d == today || Some(d) == tomorrow,
            None => false,
        })
        .cloned()
        .collect()
}
