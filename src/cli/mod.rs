pub mod history;
pub mod overview;
pub mod portfolio;
pub mod quote;
pub mod screen;
pub mod sectors;
pub mod setup;
pub mod simulate;
pub mod ui;
