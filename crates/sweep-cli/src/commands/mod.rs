pub mod demo;
pub mod report;
pub mod run;
pub mod validate;
