use uuid::Uuid;

/// Event a chat is scoped to; the unit of broadcast fan-out.
pub type EventId = Uuid;

/// Authenticated user behind a connection.
pub type UserId = Uuid;

/// One live connection. Fresh per connection, never reused.
pub type ClientId = Uuid;
