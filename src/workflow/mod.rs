pub mod query_flow;
pub mod result_parser;

pub use query_flow::{QueryFlow, QueryFlowFactory, QueryRunner, QueryState, RunnerFactory};
pub use result_parser::parse_result_table;
