use chrono::NaiveDateTime;
use serde::Serialize;

use crate::rating::{ItemId, RatingValue, ReviewId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub item_id: ItemId,
    pub user_id: UserId,
    pub rating: RatingValue,
    pub review_text: Option<String>,
    pub created_at: NaiveDateTime,
}
