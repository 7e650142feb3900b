pub mod approval;
pub mod convergence;
pub mod custom_command;
pub mod github_actions;
pub mod verification;
