mod tests_admission;
