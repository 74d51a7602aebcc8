use std::collections::{HashMap, HashSet};

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use hearth_db::models::{NewExpense, NewPayment, PaymentRow};
use hearth_ledger::{Cents, dedup_members, split_amount};
use hearth_types::api::{Claims, CreateExpenseRequest, UpdatePaymentRequest};
use hearth_types::models::{Expense, Payment};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::houses::require_member;
use crate::{convert, with_db};

/// Currency of a house, used to render amounts.
async fn house_currency(state: &AppState, house_id: &str) -> Result<String, ApiError> {
    let hid = house_id.to_string();
    let house = with_db(state, move |db| db.get_house(&hid))
        .await?
        .ok_or_else(|| ApiError::not_found("House not found"))?;
    Ok(house.currency)
}

/// Expenses of a house, newest first, each with its payments.
pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    require_member(&state, house_id, claims.sub).await?;
    let currency = house_currency(&state, &house_id.to_string()).await?;

    let hid = house_id.to_string();
    let (rows, payments) = with_db(&state, move |db| {
        let rows = db.list_expenses(&hid)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let payments = db.get_payments_for_expenses(&ids)?;
        Ok((rows, payments))
    })
    .await?;

    let mut by_expense: HashMap<String, Vec<PaymentRow>> = HashMap::new();
    for p in payments {
        by_expense.entry(p.expense_id.clone()).or_default().push(p);
    }

    let expenses = rows
        .into_iter()
        .map(|row| {
            let payments = by_expense.remove(&row.id).unwrap_or_default();
            convert::expense(row, payments, &currency)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(expenses))
}

/// Record an expense and split it across the selected members.
///
/// The expense and every payment row are written in one transaction.
pub async fn create_expense(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    let amount = Cents::from_decimal(req.amount)?;
    let recurrence_period = match (req.is_recurring, req.recurrence_period) {
        (true, Some(period)) => Some(period),
        (true, None) => {
            return Err(ApiError::validation("Recurring expenses need a recurrence period"));
        }
        (false, _) => None,
    };

    let selected = dedup_members(&req.split_with);
    let hid = house_id.to_string();
    let house_members: HashSet<Uuid> = with_db(&state, move |db| db.list_members(&hid))
        .await?
        .into_iter()
        .map(|m| convert::parse_uuid("member user_id", &m.user_id))
        .collect::<Result<_, _>>()?;
    if let Some(outsider) = selected.iter().find(|id| !house_members.contains(*id)) {
        return Err(ApiError::validation(format!(
            "User {} is not a member of this house",
            outsider
        )));
    }

    let drafts = split_amount(amount, &selected, state.split_policy)?;

    let expense = NewExpense {
        id: Uuid::new_v4().to_string(),
        house_id: house_id.to_string(),
        created_by: claims.sub.to_string(),
        title,
        amount_cents: amount.0,
        recurrence_period: recurrence_period.map(|p| p.as_str().to_string()),
        split_with: selected.iter().map(Uuid::to_string).collect(),
        due_date: req.due_date.map(|d| d.to_string()),
    };
    let payments: Vec<NewPayment> = drafts
        .into_iter()
        .map(|d| NewPayment {
            id: Uuid::new_v4().to_string(),
            user_id: d.member.to_string(),
            amount_cents: d.amount.0,
        })
        .collect();

    let currency = house_currency(&state, &expense.house_id).await?;
    let eid = expense.id.clone();
    let (row, payment_rows) = with_db(&state, move |db| {
        db.create_expense(&expense, &payments)?;
        let row = db
            .get_expense(&eid)?
            .ok_or_else(|| anyhow::anyhow!("expense {} missing after insert", eid))?;
        let payments = db.get_payments_for_expenses(std::slice::from_ref(&eid))?;
        Ok((row, payments))
    })
    .await?;

    let expense = convert::expense(row, payment_rows, &currency)?;
    Ok((StatusCode::CREATED, Json(expense)))
}

/// Mark a payment paid or unpaid. Allowed for the member who owes it and for
/// the member who created the expense.
pub async fn update_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<UpdatePaymentRequest>,
) -> Result<Json<Payment>, ApiError> {
    let not_found = || ApiError::not_found("Payment not found");

    let pid = payment_id.to_string();
    let ctx = with_db(&state, move |db| db.get_payment(&pid))
        .await?
        .ok_or_else(not_found)?;

    let house_id = convert::parse_uuid("expense house_id", &ctx.house_id)?;
    require_member(&state, house_id, claims.sub)
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => not_found(),
            e => e,
        })?;

    let caller = claims.sub.to_string();
    if ctx.payment.user_id != caller && ctx.expense_created_by != caller {
        return Err(ApiError::forbidden(
            "Only the payer or the expense creator can update this payment",
        ));
    }

    let pid = payment_id.to_string();
    let paid = req.paid;
    let row = with_db(&state, move |db| db.set_payment_paid(&pid, paid))
        .await?
        .ok_or_else(not_found)?;

    info!("Payment {} marked paid={} by {}", payment_id, paid, claims.sub);
    let currency = house_currency(&state, &ctx.house_id).await?;
    Ok(Json(convert::payment(row, &currency)?))
}
