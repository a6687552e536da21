pub mod movie;
pub mod user;
pub mod user_movie;
pub mod user_rating;
pub mod user_review;
