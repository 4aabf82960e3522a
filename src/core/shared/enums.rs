//! Database enum types.
//!
//! Every enum is stored as a `SMALLINT` column and travels over the wire in
//! `SCREAMING_SNAKE_CASE`, so `IN_PROGRESS` in JSON is `2` in PostgreSQL.

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::SmallInt;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;

fn read_small_int(bytes: PgValue<'_>) -> deserialize::Result<i16> {
    <i16 as FromSql<SmallInt, Pg>>::from_sql(bytes)
}

// ============================================================================
// ROLE
// ============================================================================

/// Authority carried by an authenticated principal.
///
/// Employees are stored as `Employee` or `Admin`; customers always act as
/// `Customer`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum Role {
    Employee = 0,
    Admin = 1,
    Customer = 2,
}

impl Default for Role {
    fn default() -> Self {
        Self::Employee
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "EMPLOYEE",
            Self::Admin => "ADMIN",
            Self::Customer => "CUSTOMER",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Employee | Self::Admin)
    }
}

impl ToSql<SmallInt, Pg> for Role {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for Role {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::Employee),
            1 => Ok(Self::Admin),
            2 => Ok(Self::Customer),
            _ => Err(format!("Unknown Role: {}", value).into()),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "EMPLOYEE" => Ok(Self::Employee),
            "ADMIN" => Ok(Self::Admin),
            "CUSTOMER" => Ok(Self::Customer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

// ============================================================================
// TICKET STATUS
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TicketStatus {
    New = 0,
    Open = 1,
    InProgress = 2,
    Resolved = 3,
    Closed = 4,
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        Self::New,
        Self::Open,
        Self::InProgress,
        Self::Resolved,
        Self::Closed,
    ];

    /// Whether the resolution workflow may still close this ticket out.
    pub fn is_resolvable(&self) -> bool {
        matches!(self, Self::New | Self::Open | Self::InProgress)
    }

    /// Transitions allowed through a plain status update. `Resolved` is only
    /// reachable by recording a resolution.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Open)
                | (Self::New, Self::InProgress)
                | (Self::Open, Self::InProgress)
                | (Self::InProgress, Self::Open)
                | (Self::Resolved, Self::Closed)
        )
    }
}

impl ToSql<SmallInt, Pg> for TicketStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for TicketStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::New),
            1 => Ok(Self::Open),
            2 => Ok(Self::InProgress),
            3 => Ok(Self::Resolved),
            4 => Ok(Self::Closed),
            _ => Err(format!("Unknown TicketStatus: {}", value).into()),
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Open => write!(f, "OPEN"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "OPEN" => Ok(Self::Open),
            "IN_PROGRESS" | "INPROGRESS" => Ok(Self::InProgress),
            "RESOLVED" => Ok(Self::Resolved),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(format!("Unknown ticket status: {}", s)),
        }
    }
}

// ============================================================================
// TICKET PRIORITY
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TicketPriority {
    Low = 0,
    Medium = 1,
    High = 2,
    Urgent = 3,
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl ToSql<SmallInt, Pg> for TicketPriority {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for TicketPriority {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Medium),
            2 => Ok(Self::High),
            3 => Ok(Self::Urgent),
            _ => Err(format!("Unknown TicketPriority: {}", value).into()),
        }
    }
}

// ============================================================================
// CUSTOMER TYPE
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum CustomerType {
    Individual = 0,
    Business = 1,
}

impl Default for CustomerType {
    fn default() -> Self {
        Self::Individual
    }
}

impl ToSql<SmallInt, Pg> for CustomerType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for CustomerType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::Individual),
            1 => Ok(Self::Business),
            _ => Err(format!("Unknown CustomerType: {}", value).into()),
        }
    }
}

// ============================================================================
// ACTIVITY STATUS
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum ActivityStatus {
    Active = 0,
    Inactive = 1,
    Deleted = 2,
}

impl Default for ActivityStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl ToSql<SmallInt, Pg> for ActivityStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for ActivityStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::Active),
            1 => Ok(Self::Inactive),
            2 => Ok(Self::Deleted),
            _ => Err(format!("Unknown ActivityStatus: {}", value).into()),
        }
    }
}

// ============================================================================
// LEAD SOURCE
// ============================================================================

/// Where a lead came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum LeadSource {
    Website = 0,
    Internet = 1,
    Referral = 2,
    Brochure = 3,
    Advertisement = 4,
    Email = 5,
    Phone = 6,
    Event = 7,
    Other = 8,
    Unknown = 9,
}

impl Default for LeadSource {
    fn default() -> Self {
        Self::Unknown
    }
}

impl LeadSource {
    pub const ALL: [LeadSource; 10] = [
        Self::Website,
        Self::Internet,
        Self::Referral,
        Self::Brochure,
        Self::Advertisement,
        Self::Email,
        Self::Phone,
        Self::Event,
        Self::Other,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "WEBSITE",
            Self::Internet => "INTERNET",
            Self::Referral => "REFERRAL",
            Self::Brochure => "BROCHURE",
            Self::Advertisement => "ADVERTISEMENT",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Event => "EVENT",
            Self::Other => "OTHER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl ToSql<SmallInt, Pg> for LeadSource {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for LeadSource {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::Website),
            1 => Ok(Self::Internet),
            2 => Ok(Self::Referral),
            3 => Ok(Self::Brochure),
            4 => Ok(Self::Advertisement),
            5 => Ok(Self::Email),
            6 => Ok(Self::Phone),
            7 => Ok(Self::Event),
            8 => Ok(Self::Other),
            9 => Ok(Self::Unknown),
            _ => Err(format!("Unknown LeadSource: {}", value).into()),
        }
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LEAD STATUS
// ============================================================================

/// Position of a lead in the sales pipeline. `Converted` is only reached by
/// converting the lead into a customer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum LeadStatus {
    New = 0,
    Contacted = 1,
    Qualified = 2,
    Converted = 3,
    Lost = 4,
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::Converted,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Contacted => "CONTACTED",
            Self::Qualified => "QUALIFIED",
            Self::Converted => "CONVERTED",
            Self::Lost => "LOST",
        }
    }
}

impl ToSql<SmallInt, Pg> for LeadStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for LeadStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::New),
            1 => Ok(Self::Contacted),
            2 => Ok(Self::Qualified),
            3 => Ok(Self::Converted),
            4 => Ok(Self::Lost),
            _ => Err(format!("Unknown LeadStatus: {}", value).into()),
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// QUOTATION STAGE
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum QuotationStage {
    Draft = 0,
    Sent = 1,
    Accepted = 2,
    Rejected = 3,
    Expired = 4,
}

impl Default for QuotationStage {
    fn default() -> Self {
        Self::Draft
    }
}

impl QuotationStage {
    pub const ALL: [QuotationStage; 5] = [
        Self::Draft,
        Self::Sent,
        Self::Accepted,
        Self::Rejected,
        Self::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Sent => "SENT",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Drafts are internal; customers only ever see a quotation once sent.
    pub fn is_visible_to_customer(&self) -> bool {
        !matches!(self, Self::Draft)
    }

    pub fn can_transition_to(&self, next: QuotationStage) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Sent)
                | (Self::Sent, Self::Accepted)
                | (Self::Sent, Self::Rejected)
                | (Self::Sent, Self::Expired)
        )
    }
}

impl ToSql<SmallInt, Pg> for QuotationStage {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for QuotationStage {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::Draft),
            1 => Ok(Self::Sent),
            2 => Ok(Self::Accepted),
            3 => Ok(Self::Rejected),
            4 => Ok(Self::Expired),
            _ => Err(format!("Unknown QuotationStage: {}", value).into()),
        }
    }
}

impl std::fmt::Display for QuotationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// INVOICE STATUS
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum InvoiceStatus {
    Pending = 0,
    Sent = 1,
    Paid = 2,
    Cancelled = 3,
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// `Paid` and `Cancelled` are final.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sent)
                | (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Cancelled)
                | (Self::Sent, Self::Paid)
                | (Self::Sent, Self::Cancelled)
        )
    }

    /// Paid or sent invoices are part of the customer's record and stay.
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Pending | Self::Cancelled)
    }
}

impl ToSql<SmallInt, Pg> for InvoiceStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for InvoiceStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = read_small_int(bytes)?;
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Sent),
            2 => Ok(Self::Paid),
            3 => Ok(Self::Cancelled),
            _ => Err(format!("Unknown InvoiceStatus: {}", value).into()),
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
