use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub rating: i32, // 1-5
    #[serde(default)]
    pub comment: String,
    pub business_name: String,
    pub reviewer_id: ObjectId,
    #[serde(default)]
    pub reviewer_name: String,
    #[serde(default)]
    pub vehicle_id: Option<ObjectId>,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    pub business_name: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BusinessRating {
    pub business_name: String,
    pub average_rating: f64,
    pub review_count: usize,
}
