mod test_utils;

mod concurrency;
mod end_to_end;
