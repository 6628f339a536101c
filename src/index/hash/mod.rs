mod extendible;

pub use extendible::ExtendibleHashTable;
