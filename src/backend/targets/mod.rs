use strum::{Display, EnumString};

use crate::{backend::CodegenOptions, middle::ir};

mod javascript;

pub trait CodeGenerator {
    fn generate(&self, program: &ir::Program, options: &CodegenOptions) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Target {
    JavaScript,
}

impl Target {
    pub fn get_code_generator(self) -> impl CodeGenerator {
        match self {
            Target::JavaScript => javascript::CodeGeneratorJavaScript,
        }
    }
}
