pub mod flash_tests;
