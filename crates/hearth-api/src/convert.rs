//! Row → API model conversion.
//!
//! Everything read back from SQLite is re-validated here. A malformed id,
//! timestamp or enum value fails the request instead of being defaulted.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use hearth_db::models::{
    ExpenseRow, HouseMembershipRow, HouseRow, MemberRow, NoteImageRow, NoteRow, PaymentRow,
    PresenceRow, ProfileRow,
};
use hearth_ledger::{Cents, format_amount};
use hearth_types::models::{
    Expense, House, HouseMembership, Member, Note, NoteCategory, NoteImage, Payment, Presence,
    Profile, RecurrencePeriod,
};

use crate::error::ApiError;
use crate::storage::Storage;

fn corrupt(what: &str, value: &str, e: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(anyhow::anyhow!("Corrupt {} '{}': {}", what, value, e))
}

pub fn parse_uuid(what: &str, value: &str) -> Result<Uuid, ApiError> {
    value.parse().map_err(|e| corrupt(what, value, e))
}

pub fn parse_ts(what: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(what, value, e))
}

fn parse_enum<T: FromStr>(what: &str, value: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| corrupt(what, value, e))
}

pub fn profile(row: ProfileRow, storage: &Storage) -> Result<Profile, ApiError> {
    Ok(Profile {
        id: parse_uuid("profile id", &row.id)?,
        email: row.email,
        username: row.username,
        avatar_url: row.avatar_key.map(|k| storage.public_url(&k)),
        created_at: parse_ts("profile created_at", &row.created_at)?,
        updated_at: parse_ts("profile updated_at", &row.updated_at)?,
    })
}

pub fn house(row: HouseRow, storage: &Storage) -> Result<House, ApiError> {
    Ok(House {
        id: parse_uuid("house id", &row.id)?,
        name: row.name,
        address: row.address,
        invite_code: row.invite_code,
        currency: row.currency,
        avatar_url: row.avatar_key.map(|k| storage.public_url(&k)),
        created_by: parse_uuid("house created_by", &row.created_by)?,
        created_at: parse_ts("house created_at", &row.created_at)?,
    })
}

pub fn house_membership(row: HouseMembershipRow, storage: &Storage) -> Result<HouseMembership, ApiError> {
    Ok(HouseMembership {
        joined_at: parse_ts("membership joined_at", &row.joined_at)?,
        is_admin: row.is_admin,
        house: house(row.house, storage)?,
    })
}

pub fn member(row: MemberRow, storage: &Storage) -> Result<Member, ApiError> {
    Ok(Member {
        user_id: parse_uuid("member user_id", &row.user_id)?,
        username: row.username,
        avatar_url: row.avatar_key.map(|k| storage.public_url(&k)),
        is_admin: row.is_admin,
        joined_at: parse_ts("member joined_at", &row.joined_at)?,
        is_home: row.is_home.unwrap_or(false),
        presence_updated_at: row
            .presence_updated
            .as_deref()
            .map(|ts| parse_ts("presence last_updated", ts))
            .transpose()?,
    })
}

/// A missing row means the member has never said they are home.
pub fn presence(house_id: Uuid, user_id: Uuid, row: Option<PresenceRow>) -> Result<Presence, ApiError> {
    Ok(match row {
        Some(row) => Presence {
            house_id,
            user_id,
            is_home: row.is_home,
            last_updated: Some(parse_ts("presence last_updated", &row.last_updated)?),
        },
        None => Presence {
            house_id,
            user_id,
            is_home: false,
            last_updated: None,
        },
    })
}

pub fn payment(row: PaymentRow, currency: &str) -> Result<Payment, ApiError> {
    let amount = Cents(row.amount_cents);
    Ok(Payment {
        id: parse_uuid("payment id", &row.id)?,
        expense_id: parse_uuid("payment expense_id", &row.expense_id)?,
        user_id: parse_uuid("payment user_id", &row.user_id)?,
        amount_cents: amount,
        amount: format_amount(amount, currency),
        paid: row.paid,
        paid_at: row
            .paid_at
            .as_deref()
            .map(|ts| parse_ts("payment paid_at", ts))
            .transpose()?,
    })
}

pub fn expense(row: ExpenseRow, payments: Vec<PaymentRow>, currency: &str) -> Result<Expense, ApiError> {
    let split_ids: Vec<String> =
        serde_json::from_str(&row.split_with).map_err(|e| corrupt("expense split_with", &row.split_with, e))?;
    let split_with = split_ids
        .iter()
        .map(|id| parse_uuid("expense split member", id))
        .collect::<Result<Vec<_>, _>>()?;

    let recurrence_period = match (row.is_recurring, row.recurrence_period.as_deref()) {
        (true, Some(p)) => Some(parse_enum::<RecurrencePeriod>("recurrence_period", p)?),
        (true, None) => return Err(corrupt("expense recurrence", &row.id, "recurring without a period")),
        (false, _) => None,
    };

    let amount = Cents(row.amount_cents);
    Ok(Expense {
        id: parse_uuid("expense id", &row.id)?,
        house_id: parse_uuid("expense house_id", &row.house_id)?,
        amount: format_amount(amount, currency),
        amount_cents: amount,
        recurrence_period,
        due_date: row
            .due_date
            .as_deref()
            .map(|d| NaiveDate::from_str(d).map_err(|e| corrupt("expense due_date", d, e)))
            .transpose()?,
        split_with,
        created_by: parse_uuid("expense created_by", &row.created_by)?,
        created_by_username: row.created_by_username,
        created_at: parse_ts("expense created_at", &row.created_at)?,
        title: row.title,
        payments: payments
            .into_iter()
            .map(|p| payment(p, currency))
            .collect::<Result<Vec<_>, _>>()?,
    })
}

pub fn note(row: NoteRow, images: Vec<NoteImageRow>, storage: &Storage) -> Result<Note, ApiError> {
    Ok(Note {
        id: parse_uuid("note id", &row.id)?,
        house_id: parse_uuid("note house_id", &row.house_id)?,
        category: parse_enum::<NoteCategory>("note category", &row.category)?,
        created_by: parse_uuid("note created_by", &row.created_by)?,
        created_by_username: row.created_by_username,
        created_at: parse_ts("note created_at", &row.created_at)?,
        updated_at: parse_ts("note updated_at", &row.updated_at)?,
        title: row.title,
        content: row.content,
        images: images
            .into_iter()
            .map(|img| {
                Ok(NoteImage {
                    id: parse_uuid("image id", &img.id)?,
                    url: storage.public_url(&img.storage_key),
                    content_type: img.content_type,
                    size: u64::try_from(img.size).map_err(|e| corrupt("image size", &img.id, e))?,
                    sha256: img.sha256,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?,
    })
}
