//! Pure bookkeeping logic shared by the service: invite codes, money and
//! expense splitting. Nothing in here touches the database or the network.

pub mod invite;
pub mod money;
pub mod split;

pub use invite::{generate_invite_code, is_well_formed, normalize_invite_code};
pub use money::{Cents, DEFAULT_CURRENCY, MoneyError, format_amount, is_supported_currency};
pub use split::{PaymentDraft, SplitError, SplitPolicy, dedup_members, split_amount};
