use anyhow::Result;
use rusqlite::Row;
use tracing::info;

use super::{OptionalExt, placeholders};
use crate::models::{ExpenseRow, NewExpense, NewPayment, PaymentContextRow, PaymentRow};
use crate::{Database, now};

impl Database {
    // -- Expenses --

    /// Insert an expense and all of its payments atomically.
    pub fn create_expense(&self, expense: &NewExpense, payments: &[NewPayment]) -> Result<()> {
        let split_with = serde_json::to_string(&expense.split_with)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO expenses (id, house_id, created_by, title, amount_cents, is_recurring,
                                       recurrence_period, split_with, due_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    expense.id,
                    expense.house_id,
                    expense.created_by,
                    expense.title,
                    expense.amount_cents,
                    expense.recurrence_period.is_some(),
                    expense.recurrence_period,
                    split_with,
                    expense.due_date,
                    now(),
                ],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO expense_payments (id, expense_id, user_id, amount_cents, paid)
                     VALUES (?1, ?2, ?3, ?4, 0)",
                )?;
                for p in payments {
                    stmt.execute((&p.id, &expense.id, &p.user_id, p.amount_cents))?;
                }
            }

            tx.commit()?;
            info!(
                "Expense {} created in house {} with {} payments",
                expense.id,
                expense.house_id,
                payments.len()
            );
            Ok(())
        })
    }

    /// Expenses of a house, newest first.
    pub fn list_expenses(&self, house_id: &str) -> Result<Vec<ExpenseRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE e.house_id = ?1 ORDER BY e.created_at DESC", EXPENSE_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([house_id], expense_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_expense(&self, expense_id: &str) -> Result<Option<ExpenseRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE e.id = ?1", EXPENSE_SELECT);
            conn.query_row(&sql, [expense_id], expense_from_row).optional()
        })
    }

    // -- Payments --

    /// Batch-fetch payments for a set of expense IDs.
    pub fn get_payments_for_expenses(&self, expense_ids: &[String]) -> Result<Vec<PaymentRow>> {
        if expense_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, expense_id, user_id, amount_cents, paid, paid_at
                 FROM expense_payments WHERE expense_id IN ({})
                 ORDER BY rowid ASC",
                placeholders(expense_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(expense_ids.iter()), payment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_payment(&self, payment_id: &str) -> Result<Option<PaymentContextRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT p.id, p.expense_id, p.user_id, p.amount_cents, p.paid, p.paid_at,
                        e.house_id, e.created_by
                 FROM expense_payments p
                 JOIN expenses e ON e.id = p.expense_id
                 WHERE p.id = ?1",
                [payment_id],
                |row| {
                    Ok(PaymentContextRow {
                        payment: payment_from_row(row)?,
                        house_id: row.get(6)?,
                        expense_created_by: row.get(7)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Mark a payment paid (stamping `paid_at`) or unpaid (clearing it).
    pub fn set_payment_paid(&self, payment_id: &str, paid: bool) -> Result<Option<PaymentRow>> {
        self.with_conn_mut(|conn| {
            let paid_at = paid.then(now);
            let n = conn.execute(
                "UPDATE expense_payments SET paid = ?2, paid_at = ?3 WHERE id = ?1",
                rusqlite::params![payment_id, paid, paid_at],
            )?;
            if n == 0 {
                return Ok(None);
            }
            conn.query_row(
                "SELECT id, expense_id, user_id, amount_cents, paid, paid_at
                 FROM expense_payments WHERE id = ?1",
                [payment_id],
                payment_from_row,
            )
            .optional()
        })
    }
}

const EXPENSE_SELECT: &str =
    "SELECT e.id, e.house_id, e.created_by, p.username, e.title, e.amount_cents,
            e.is_recurring, e.recurrence_period, e.split_with, e.due_date, e.created_at
     FROM expenses e
     LEFT JOIN profiles p ON p.id = e.created_by";

fn expense_from_row(row: &Row<'_>) -> rusqlite::Result<ExpenseRow> {
    Ok(ExpenseRow {
        id: row.get(0)?,
        house_id: row.get(1)?,
        created_by: row.get(2)?,
        created_by_username: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        title: row.get(4)?,
        amount_cents: row.get(5)?,
        is_recurring: row.get(6)?,
        recurrence_period: row.get(7)?,
        split_with: row.get(8)?,
        due_date: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        id: row.get(0)?,
        expense_id: row.get(1)?,
        user_id: row.get(2)?,
        amount_cents: row.get(3)?,
        paid: row.get(4)?,
        paid_at: row.get(5)?,
    })
}
