pub mod vouchers;
