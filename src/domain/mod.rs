pub mod inject;
pub mod line_map;
pub mod printer;
pub mod probe;
pub mod select;
pub mod tree;
pub mod tree_path;
