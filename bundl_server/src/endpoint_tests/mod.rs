mod auth;
mod credits;
mod helpers;
mod mocks;
mod orders;
