pub mod effect;
pub mod markup;
pub mod node;
pub mod outcome;
