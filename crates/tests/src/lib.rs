#[cfg(test)]
mod common;


#[cfg(test)]
mod submission_tests;
