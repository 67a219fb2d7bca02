//! JSON-schema fragments for tool and structured-output declarations.

mod declaration;
mod fragment;

pub mod prelude {
    pub use crate::{
        StructuredOutput, SchemaFragment, ToolDeclaration, any_of, array, boolean, float, integer,
        nullable, object, string, structured_output, tool_declaration,
    };
}

pub use declaration::{StructuredOutput, ToolDeclaration, structured_output, tool_declaration};
pub use fragment::{
    SchemaFragment, any_of, array, boolean, float, integer, nullable, object, string,
};
