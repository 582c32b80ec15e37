pub mod pinjaman;
