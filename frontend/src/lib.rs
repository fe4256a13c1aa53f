pub mod notation;
pub mod printer;

pub use notation::{parse, parse_statements, ParserError, Reader};
pub use printer::Printed;
