use std::fmt;

use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type UserId = i32;
pub type BookId = i32;
pub type BorrowId = i32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Apiv2Schema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Student => write!(f, "student"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Account data as kept in the users store, without credentials
pub struct UserDetails {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Public view of an account returned to clients
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
}

impl UserProfile {
    pub fn new(id: UserId, details: UserDetails) -> Self {
        Self {
            id,
            name: details.name,
            email: details.email,
            role: details.role,
            student_code: details.student_code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub student_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
/// Login credentials, `email` may also hold an 8 digit student id (MSSV)
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Profile edit, password change requires the current password
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

fn default_category() -> String {
    "others".to_string()
}

fn default_stock() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Struct representing a catalog entry as stored
pub struct BookDetails {
    pub title: String,
    pub author: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub pages: u32,
    #[serde(default = "default_stock")]
    pub stock: u32,
    #[serde(default = "default_stock")]
    pub available: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Body of a book creation request. Missing `available` defaults to `stock`
pub struct NewBook {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "img", alias = "image", skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Struct representing a patch to book details. Allows to specify only a few fields and patch the current details
pub struct BookDetailsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(alias = "img", alias = "image", skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Book as returned to clients, `img` and `image` mirror `coverImage` for older frontends
pub struct BookResponse {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub category: String,
    pub cover_image: String,
    pub img: String,
    pub image: String,
    pub description: String,
    pub intro: String,
    pub file_url: String,
    pub pages: u32,
    pub stock: u32,
    pub available: u32,
}

impl BookResponse {
    pub fn new(id: BookId, details: BookDetails) -> Self {
        Self {
            id,
            img: details.cover_image.clone(),
            image: details.cover_image.clone(),
            title: details.title,
            author: details.author,
            category: details.category,
            cover_image: details.cover_image,
            description: details.description,
            intro: details.intro,
            file_url: details.file_url,
            pages: details.pages,
            stock: details.stock,
            available: details.available,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Catalog search, `keyword` matches title or author, `category` "all" disables the filter
pub struct BookQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Apiv2Schema)]
/// Status of a borrow record as shown to clients. `Overdue` is never stored
pub enum BorrowStatus {
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    Borrowing,
    Overdue,
    Returned,
    Rejected,
}

impl fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BorrowStatus::PendingApproval => "Pending Approval",
            BorrowStatus::Borrowing => "Borrowing",
            BorrowStatus::Overdue => "Overdue",
            BorrowStatus::Returned => "Returned",
            BorrowStatus::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// `userId` is honoured only for admins, everybody else borrows for themselves
pub struct CreateBorrowRequest {
    pub book_id: BookId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BorrowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<BookId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Borrow record as listed for librarians
pub struct BorrowAdminView {
    pub id: BorrowId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub title: String,
    pub book_title: String,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrow_date: String,
    pub due_date: String,
    pub status: BorrowStatus,
    pub extended_days: u32,
    pub extensions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Borrow record as listed for its borrower
pub struct BorrowStudentView {
    pub id: BorrowId,
    pub book_id: BookId,
    pub title: String,
    pub book_title: String,
    pub borrow_date: String,
    pub due_date: String,
    pub status: BorrowStatus,
    pub days_remaining: Option<i64>,
    pub extended_days: u32,
    pub extensions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct HealthResponse {
    pub ok: bool,
}
