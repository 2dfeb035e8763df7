mod compiler_tests;
mod generator_tests;
mod lexer_tests;
mod parser_tests;
mod unparse_tests;
