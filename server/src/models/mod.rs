pub mod request;
pub mod response;
pub mod ticket;

pub use request::{Pagination, PoisonRecord, SoldOutEvent, StockMutation};
pub use response::{
    Envelope, InquiryTicketAmount, OnlineTicket, Page, Profile, StockTicket, TicketResponse,
    TokenValidation,
};
pub use ticket::{normalize_region, Ticket, TicketDetail, ONLINE};
