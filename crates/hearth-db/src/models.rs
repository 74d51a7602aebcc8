//! Database row types. Each maps directly to one SQLite query result.
//! Distinct from hearth-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct ProfileRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub avatar_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct HouseRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub invite_code: String,
    pub currency: String,
    pub avatar_key: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct MembershipRow {
    pub id: String,
    pub house_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub joined_at: String,
}

pub struct HouseMembershipRow {
    pub house: HouseRow,
    pub is_admin: bool,
    pub joined_at: String,
}

pub struct MemberRow {
    pub user_id: String,
    pub username: String,
    pub avatar_key: Option<String>,
    pub is_admin: bool,
    pub joined_at: String,
    /// None when the member has never set their presence.
    pub is_home: Option<bool>,
    pub presence_updated: Option<String>,
}

pub struct ExpenseRow {
    pub id: String,
    pub house_id: String,
    pub created_by: String,
    pub created_by_username: String,
    pub title: String,
    pub amount_cents: i64,
    pub is_recurring: bool,
    pub recurrence_period: Option<String>,
    /// JSON array of user ids.
    pub split_with: String,
    pub due_date: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub id: String,
    pub expense_id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub paid: bool,
    pub paid_at: Option<String>,
}

/// A payment plus the expense fields needed to authorize changes to it.
pub struct PaymentContextRow {
    pub payment: PaymentRow,
    pub house_id: String,
    pub expense_created_by: String,
}

pub struct NoteRow {
    pub id: String,
    pub house_id: String,
    pub created_by: String,
    pub created_by_username: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NoteImageRow {
    pub id: String,
    pub note_id: String,
    pub storage_key: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
    pub position: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PresenceRow {
    pub id: String,
    pub user_id: String,
    pub house_id: String,
    pub is_home: bool,
    pub last_updated: String,
}

// -- Inserts --

pub struct NewHouse {
    pub id: String,
    pub name: String,
    pub address: String,
    pub currency: String,
    pub created_by: String,
    /// Id for the creator's admin membership row.
    pub membership_id: String,
}

pub struct NewExpense {
    pub id: String,
    pub house_id: String,
    pub created_by: String,
    pub title: String,
    pub amount_cents: i64,
    pub recurrence_period: Option<String>,
    pub split_with: Vec<String>,
    pub due_date: Option<String>,
}

pub struct NewPayment {
    pub id: String,
    pub user_id: String,
    pub amount_cents: i64,
}

pub struct NewNote {
    pub id: String,
    pub house_id: String,
    pub created_by: String,
    pub title: String,
    pub content: String,
    pub category: String,
}

pub struct NewNoteImage {
    pub id: String,
    pub storage_key: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
}
