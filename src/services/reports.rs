//! Aggregates computed from already-fetched records.

use std::collections::BTreeMap;

use chrono::{DateTime as ChronoDateTime, NaiveDate, Utc};
use mongodb::bson::{doc, DateTime, Document};
use serde::Serialize;

use crate::models::{
    rental::{Rental, RentalQuery, RentalStatus},
    review::{BusinessRating, Review},
};

#[derive(Debug, Serialize, PartialEq)]
pub struct RentalSummary {
    pub total_rentals: usize,
    pub total_revenue: f64,
    pub average_amount: f64,
    pub by_status: BTreeMap<&'static str, usize>,
}

pub fn summarize_rentals(rentals: &[Rental]) -> RentalSummary {
    let mut by_status: BTreeMap<&'static str, usize> =
        RentalStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    let mut total_revenue = 0.0;
    let mut billable = 0usize;

    for rental in rentals {
        *by_status.entry(rental.status.as_str()).or_insert(0) += 1;
        if rental.status.is_billable() {
            total_revenue += rental.amount;
            billable += 1;
        }
    }

    RentalSummary {
        total_rentals: rentals.len(),
        total_revenue,
        average_amount: if billable == 0 {
            0.0
        } else {
            total_revenue / billable as f64
        },
        by_status,
    }
}

/// Parses `YYYY-MM-DD` into the start of that UTC day.
pub fn parse_day(raw: &str) -> Option<DateTime> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some(DateTime::from_millis(start.timestamp_millis()))
}

/// Builds the Mongo filter for a rental query; `Err` names the bad bound.
pub fn rental_filter(query: &RentalQuery) -> Result<Document, String> {
    let mut filter = Document::new();

    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }

    let mut range = Document::new();
    if let Some(from) = query.from.as_deref() {
        let from = parse_day(from).ok_or_else(|| format!("Invalid 'from' date: {}", from))?;
        range.insert("$gte", from);
    }
    if let Some(to) = query.to.as_deref() {
        let to = parse_day(to).ok_or_else(|| format!("Invalid 'to' date: {}", to))?;
        // Inclusive: everything before the start of the following day.
        let next_day = DateTime::from_millis(to.timestamp_millis() + 24 * 60 * 60 * 1000);
        range.insert("$lt", next_day);
    }
    if !range.is_empty() {
        filter.insert("start_date", range);
    }

    Ok(filter)
}

pub fn rentals_csv(rentals: &[Rental]) -> String {
    let mut csv = String::from("Customer,Email,Vehicle,Start,End,Amount,Status\n");
    for rental in rentals {
        let vehicle = rental
            .vehicle_name
            .clone()
            .unwrap_or_else(|| rental.vehicle_id.to_hex());
        let row = [
            escape(&rental.customer_name),
            escape(&rental.customer_email),
            escape(&vehicle),
            format_day(rental.start_date),
            format_day(rental.end_date),
            format!("{:.2}", rental.amount),
            rental.status.as_str().to_string(),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_day(value: DateTime) -> String {
    ChronoDateTime::<Utc>::from_timestamp_millis(value.timestamp_millis())
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Average rating per business, best rated first.
pub fn average_by_business(reviews: &[Review]) -> Vec<BusinessRating> {
    let mut totals: BTreeMap<&str, (i64, usize)> = BTreeMap::new();
    for review in reviews {
        let entry = totals.entry(review.business_name.as_str()).or_insert((0, 0));
        entry.0 += i64::from(review.rating);
        entry.1 += 1;
    }

    let mut ratings: Vec<BusinessRating> = totals
        .into_iter()
        .map(|(name, (sum, count))| BusinessRating {
            business_name: name.to_string(),
            average_rating: (sum as f64 / count as f64 * 100.0).round() / 100.0,
            review_count: count,
        })
        .collect();
    ratings.sort_by(|a, b| {
        b.average_rating
            .total_cmp(&a.average_rating)
            .then_with(|| a.business_name.cmp(&b.business_name))
    });
    ratings
}

pub fn filter_doc_for_business(name: Option<&str>) -> Document {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => doc! { "business_name": name },
        None => Document::new(),
    }
}
