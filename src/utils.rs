pub(crate) mod level_queue;

#[cfg(test)]
pub mod test_helpers;
