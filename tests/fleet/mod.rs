//! Fleet run scenarios driven through scripted backend and transport doubles.

mod bdd_steps;
mod scenarios;
mod test_helpers;
