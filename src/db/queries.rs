use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::dates::{format_ts, parse_ts, DATE_FORMAT};
use crate::models::{
    AppliedVoucher, Booking, BookingStatus, Discount, DiscountKind, DiscountType, Hotel,
    MembershipLevel, PaymentMethod, PaymentStatus, PointsTransaction, RatingSummary, Review,
    Reward, RewardRedemption, Role, Room, RoomStatus, User,
};

fn format_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn parse_date_col(s: &str) -> anyhow::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}

// ── Users ──

const USER_COLUMNS: &str =
    "id, name, email, password_hash, phone, role, points, total_spending, membership_level, created_at";

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get(5)?;
    let level: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        phone: row.get(4)?,
        role: Role::parse(&role),
        points: row.get(6)?,
        total_spending: row.get(7)?,
        membership_level: MembershipLevel::parse(&level).unwrap_or(MembershipLevel::Bronze),
        created_at: parse_ts(&created_at),
    })
}

pub fn create_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, phone, role, points, total_spending, membership_level, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            user.id,
            user.name,
            user.email,
            user.password_hash,
            user.phone,
            user.role.as_str(),
            user.points,
            user.total_spending,
            user.membership_level.as_str(),
            format_ts(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_user_row).optional()?)
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    Ok(conn
        .query_row(&sql, params![email.to_lowercase()], parse_user_row)
        .optional()?)
}

pub fn list_users(conn: &Connection) -> anyhow::Result<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], parse_user_row)?;

    let mut users = vec![];
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

pub fn update_user_profile(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET name = ?1, phone = ?2, password_hash = ?3 WHERE id = ?4",
        params![user.name, user.phone, user.password_hash, user.id],
    )?;
    Ok(())
}

pub fn list_users_by_role(conn: &Connection, role: Role) -> anyhow::Result<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = ?1 ORDER BY name ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![role.as_str()], parse_user_row)?;

    let mut users = vec![];
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

/// Admin-side edit of the login fields.
pub fn update_user_credentials(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET name = ?1, email = ?2, password_hash = ?3 WHERE id = ?4",
        params![user.name, user.email, user.password_hash, user.id],
    )?;
    Ok(())
}

pub fn set_user_role(conn: &Connection, id: &str, role: Role) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET role = ?1 WHERE id = ?2",
        params![role.as_str(), id],
    )?;
    Ok(count > 0)
}

/// Writes the membership aggregate columns. Callers own the transaction.
pub fn update_membership_account(
    conn: &Connection,
    user_id: &str,
    points: i64,
    total_spending: i64,
    level: MembershipLevel,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET points = ?1, total_spending = ?2, membership_level = ?3 WHERE id = ?4",
        params![points, total_spending, level.as_str(), user_id],
    )?;
    Ok(())
}

// ── Sessions ──

pub fn create_session(
    conn: &Connection,
    token: &str,
    user_id: &str,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, format_ts(expires_at)],
    )?;
    Ok(())
}

pub fn get_session_user(
    conn: &Connection,
    token: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<User>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE id = (SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2)"
    );
    Ok(conn
        .query_row(&sql, params![token, format_ts(now)], parse_user_row)
        .optional()?)
}

pub fn delete_session(conn: &Connection, token: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(count > 0)
}

pub fn delete_user_sessions(conn: &Connection, user_id: &str) -> anyhow::Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?)
}

pub fn delete_expired_sessions(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![format_ts(now)],
    )?;
    Ok(count)
}

// ── Hotels ──

fn parse_hotel_row(row: &rusqlite::Row) -> rusqlite::Result<Hotel> {
    Ok(Hotel {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        region: row.get(3)?,
        description: row.get(4)?,
    })
}

pub fn save_hotel(conn: &Connection, hotel: &Hotel) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO hotels (id, name, address, region, description) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           address = excluded.address,
           region = excluded.region,
           description = excluded.description",
        params![hotel.id, hotel.name, hotel.address, hotel.region, hotel.description],
    )?;
    Ok(())
}

pub fn get_hotel(conn: &Connection, id: &str) -> anyhow::Result<Option<Hotel>> {
    Ok(conn
        .query_row(
            "SELECT id, name, address, region, description FROM hotels WHERE id = ?1",
            params![id],
            parse_hotel_row,
        )
        .optional()?)
}

pub fn list_hotels(conn: &Connection) -> anyhow::Result<Vec<Hotel>> {
    let mut stmt =
        conn.prepare("SELECT id, name, address, region, description FROM hotels ORDER BY name ASC")?;
    let rows = stmt.query_map([], parse_hotel_row)?;

    let mut hotels = vec![];
    for row in rows {
        hotels.push(row?);
    }
    Ok(hotels)
}

pub fn delete_hotel(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM hotels WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Rooms ──

const ROOM_COLUMNS: &str = "id, hotel_id, name, room_type, maxcount, beds, baths, phonenumber, rentperday, description, availability_status";

fn parse_room_row(row: &rusqlite::Row) -> rusqlite::Result<Room> {
    let status: String = row.get(10)?;
    Ok(Room {
        id: row.get(0)?,
        hotel_id: row.get(1)?,
        name: row.get(2)?,
        room_type: row.get(3)?,
        maxcount: row.get(4)?,
        beds: row.get(5)?,
        baths: row.get(6)?,
        phonenumber: row.get(7)?,
        rentperday: row.get(8)?,
        description: row.get(9)?,
        availability_status: RoomStatus::parse(&status),
    })
}

pub fn save_room(conn: &Connection, room: &Room) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO rooms (id, hotel_id, name, room_type, maxcount, beds, baths, phonenumber, rentperday, description, availability_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
           hotel_id = excluded.hotel_id,
           name = excluded.name,
           room_type = excluded.room_type,
           maxcount = excluded.maxcount,
           beds = excluded.beds,
           baths = excluded.baths,
           phonenumber = excluded.phonenumber,
           rentperday = excluded.rentperday,
           description = excluded.description,
           availability_status = excluded.availability_status",
        params![
            room.id,
            room.hotel_id,
            room.name,
            room.room_type,
            room.maxcount,
            room.beds,
            room.baths,
            room.phonenumber,
            room.rentperday,
            room.description,
            room.availability_status.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get_room(conn: &Connection, id: &str) -> anyhow::Result<Option<Room>> {
    let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_room_row).optional()?)
}

pub fn list_rooms(conn: &Connection, hotel_id: Option<&str>) -> anyhow::Result<Vec<Room>> {
    let mut rooms = vec![];
    match hotel_id {
        Some(hotel_id) => {
            let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE hotel_id = ?1 ORDER BY name ASC");
            let mut stmt = conn.prepare(&sql)?;
            for row in stmt.query_map(params![hotel_id], parse_room_row)? {
                rooms.push(row?);
            }
        }
        None => {
            let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms ORDER BY name ASC");
            let mut stmt = conn.prepare(&sql)?;
            for row in stmt.query_map([], parse_room_row)? {
                rooms.push(row?);
            }
        }
    }
    Ok(rooms)
}

/// Available rooms of the same type, excluding the given room.
pub fn find_room_suggestions(
    conn: &Connection,
    room_type: &str,
    exclude_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<Room>> {
    let sql = format!(
        "SELECT {ROOM_COLUMNS} FROM rooms
         WHERE room_type = ?1 AND id != ?2 AND availability_status = 'available'
         ORDER BY rentperday ASC LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![room_type, exclude_id, limit], parse_room_row)?;

    let mut rooms = vec![];
    for row in rows {
        rooms.push(row?);
    }
    Ok(rooms)
}

pub fn room_has_bookings(conn: &Connection, room_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE room_id = ?1",
        params![room_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn delete_room(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM rooms WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, room_id, user_id, customer_name, email, phone, checkin, checkout, adults, children, status, payment_status, payment_method, applied_vouchers, base_amount, total_amount, cancel_reason, created_at, updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let checkin_str: String = row.get(6)?;
    let checkout_str: String = row.get(7)?;
    let status_str: String = row.get(10)?;
    let payment_status_str: String = row.get(11)?;
    let payment_method_str: String = row.get(12)?;
    let vouchers_json: String = row.get(13)?;
    let created_at_str: String = row.get(17)?;
    let updated_at_str: String = row.get(18)?;

    let applied_vouchers: Vec<AppliedVoucher> =
        serde_json::from_str(&vouchers_json).unwrap_or_default();

    Ok(Booking {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        customer_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        checkin: parse_date_col(&checkin_str)?,
        checkout: parse_date_col(&checkout_str)?,
        adults: row.get(8)?,
        children: row.get(9)?,
        status: BookingStatus::parse(&status_str),
        payment_status: PaymentStatus::parse(&payment_status_str),
        payment_method: PaymentMethod::parse(&payment_method_str),
        applied_vouchers,
        base_amount: row.get(14)?,
        total_amount: row.get(15)?,
        cancel_reason: row.get(16)?,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

fn collect_bookings(
    stmt: &mut rusqlite::Statement,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<Booking>> {
    let rows = stmt.query_map(params, |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let vouchers_json = serde_json::to_string(&booking.applied_vouchers)?;

    conn.execute(
        "INSERT INTO bookings (id, room_id, user_id, customer_name, email, phone, checkin, checkout, adults, children, status, payment_status, payment_method, applied_vouchers, base_amount, total_amount, cancel_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            booking.id,
            booking.room_id,
            booking.user_id,
            booking.customer_name,
            booking.email,
            booking.phone,
            format_date(&booking.checkin),
            format_date(&booking.checkout),
            booking.adults,
            booking.children,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.payment_method.as_str(),
            vouchers_json,
            booking.base_amount,
            booking.total_amount,
            booking.cancel_reason,
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], |row| Ok(parse_booking_row(row)));

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Non-canceled bookings on the room whose [checkin, checkout) overlaps the range.
pub fn get_overlapping_bookings(
    conn: &Connection,
    room_id: &str,
    checkin: &NaiveDate,
    checkout: &NaiveDate,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE room_id = ?1 AND status != 'canceled' AND checkin < ?3 AND checkout > ?2
         ORDER BY checkin ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    collect_bookings(
        &mut stmt,
        params![room_id, format_date(checkin), format_date(checkout)],
    )
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    match status_filter {
        Some(status) => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_bookings(&mut stmt, params![status, limit])
        }
        None => {
            let sql =
                format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            collect_bookings(&mut stmt, params![limit])
        }
    }
}

pub fn get_bookings_for_user(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    collect_bookings(&mut stmt, params![user_id])
}

/// Most recent booking for the email, optionally restricted to one room.
pub fn find_latest_booking_by_email(
    conn: &Connection,
    email: &str,
    room_id: Option<&str>,
) -> anyhow::Result<Option<Booking>> {
    let bookings = match room_id {
        Some(room_id) => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE lower(email) = ?1 AND room_id = ?2
                 ORDER BY (status = 'confirmed' AND payment_status = 'paid') DESC, created_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_bookings(&mut stmt, params![email.to_lowercase(), room_id])?
        }
        None => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE lower(email) = ?1
                 ORDER BY (status = 'confirmed' AND payment_status = 'paid') DESC, created_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_bookings(&mut stmt, params![email.to_lowercase()])?
        }
    };
    Ok(bookings.into_iter().next())
}

/// Pending/pending bookings created at or before the cutoff.
pub fn get_overdue_bookings(
    conn: &Connection,
    created_before: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'pending' AND payment_status = 'pending' AND created_at <= ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    collect_bookings(&mut stmt, params![format_ts(created_before)])
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    payment_status: PaymentStatus,
    cancel_reason: Option<&str>,
) -> anyhow::Result<bool> {
    let now = format_ts(&crate::models::dates::now());
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, payment_status = ?2, cancel_reason = COALESCE(?3, cancel_reason), updated_at = ?4
         WHERE id = ?5",
        params![status.as_str(), payment_status.as_str(), cancel_reason, now, id],
    )?;
    Ok(count > 0)
}

// ── Discounts ──

const DISCOUNT_COLUMNS: &str = "id, name, code, description, kind, discount_type, discount_value, applicable_room_ids, start_date, end_date, min_booking_amount, max_discount, is_stackable, membership_level, min_spending, owner_user_id";

fn parse_discount_row(row: &rusqlite::Row) -> anyhow::Result<Discount> {
    let kind: String = row.get(4)?;
    let discount_type: String = row.get(5)?;
    let rooms_json: String = row.get(7)?;
    let start_date: String = row.get(8)?;
    let end_date: String = row.get(9)?;
    let level: Option<String> = row.get(13)?;

    Ok(Discount {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        kind: DiscountKind::parse(&kind),
        discount_type: DiscountType::parse(&discount_type),
        discount_value: row.get(6)?,
        applicable_room_ids: serde_json::from_str(&rooms_json).unwrap_or_default(),
        start_date: parse_date_col(&start_date)?,
        end_date: parse_date_col(&end_date)?,
        min_booking_amount: row.get(10)?,
        max_discount: row.get(11)?,
        is_stackable: row.get::<_, i32>(12)? != 0,
        membership_level: level.as_deref().and_then(MembershipLevel::parse),
        min_spending: row.get(14)?,
        owner_user_id: row.get(15)?,
    })
}

fn collect_discounts(
    stmt: &mut rusqlite::Statement,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<Discount>> {
    let rows = stmt.query_map(params, |row| Ok(parse_discount_row(row)))?;

    let mut discounts = vec![];
    for row in rows {
        discounts.push(row??);
    }
    Ok(discounts)
}

pub fn save_discount(conn: &Connection, d: &Discount) -> anyhow::Result<()> {
    let rooms_json = serde_json::to_string(&d.applicable_room_ids)?;
    conn.execute(
        "INSERT INTO discounts (id, name, code, description, kind, discount_type, discount_value, applicable_room_ids, start_date, end_date, min_booking_amount, max_discount, is_stackable, membership_level, min_spending, owner_user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           code = excluded.code,
           description = excluded.description,
           kind = excluded.kind,
           discount_type = excluded.discount_type,
           discount_value = excluded.discount_value,
           applicable_room_ids = excluded.applicable_room_ids,
           start_date = excluded.start_date,
           end_date = excluded.end_date,
           min_booking_amount = excluded.min_booking_amount,
           max_discount = excluded.max_discount,
           is_stackable = excluded.is_stackable,
           membership_level = excluded.membership_level,
           min_spending = excluded.min_spending,
           owner_user_id = excluded.owner_user_id",
        params![
            d.id,
            d.name,
            d.code,
            d.description,
            d.kind.as_str(),
            d.discount_type.as_str(),
            d.discount_value,
            rooms_json,
            format_date(&d.start_date),
            format_date(&d.end_date),
            d.min_booking_amount,
            d.max_discount,
            d.is_stackable as i32,
            d.membership_level.map(|l| l.as_str()),
            d.min_spending,
            d.owner_user_id,
        ],
    )?;
    Ok(())
}

pub fn get_discount(conn: &Connection, id: &str) -> anyhow::Result<Option<Discount>> {
    let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    Ok(collect_discounts(&mut stmt, params![id])?.into_iter().next())
}

pub fn get_discount_by_code(conn: &Connection, code: &str) -> anyhow::Result<Option<Discount>> {
    let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE code = ?1");
    let mut stmt = conn.prepare(&sql)?;
    Ok(collect_discounts(&mut stmt, params![code.trim().to_uppercase()])?
        .into_iter()
        .next())
}

/// Shared discounts only; personal vouchers are listed per owner.
pub fn list_discounts(conn: &Connection) -> anyhow::Result<Vec<Discount>> {
    let sql = format!(
        "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE owner_user_id IS NULL ORDER BY start_date DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    collect_discounts(&mut stmt, [])
}

pub fn list_active_discounts(
    conn: &Connection,
    day: &NaiveDate,
    kind: Option<DiscountKind>,
) -> anyhow::Result<Vec<Discount>> {
    let day = format_date(day);
    match kind {
        Some(kind) => {
            let sql = format!(
                "SELECT {DISCOUNT_COLUMNS} FROM discounts
                 WHERE owner_user_id IS NULL AND start_date <= ?1 AND end_date >= ?1 AND kind = ?2
                 ORDER BY end_date ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_discounts(&mut stmt, params![day, kind.as_str()])
        }
        None => {
            let sql = format!(
                "SELECT {DISCOUNT_COLUMNS} FROM discounts
                 WHERE owner_user_id IS NULL AND start_date <= ?1 AND end_date >= ?1
                 ORDER BY end_date ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_discounts(&mut stmt, params![day])
        }
    }
}

pub fn list_user_vouchers(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<(Discount, bool)>> {
    let sql = format!(
        "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE owner_user_id = ?1 ORDER BY end_date DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let vouchers = collect_discounts(&mut stmt, params![user_id])?;

    let mut result = Vec::with_capacity(vouchers.len());
    for voucher in vouchers {
        let used = has_redeemed_discount(conn, &voucher.id, Some(user_id), None)?;
        result.push((voucher, used));
    }
    Ok(result)
}

pub fn delete_discount(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM discounts WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// A voucher counts as used by a customer when a redemption carries their
/// account id or their booking email.
pub fn has_redeemed_discount(
    conn: &Connection,
    discount_id: &str,
    user_id: Option<&str>,
    email: Option<&str>,
) -> anyhow::Result<bool> {
    let email = email.map(|e| e.trim().to_lowercase());
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM discount_redemptions
         WHERE discount_id = ?1 AND (user_id = ?2 OR email = ?3)",
        params![discount_id, user_id, email],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Idempotent per (discount, booking).
pub fn record_discount_redemption(
    conn: &Connection,
    discount_id: &str,
    booking_id: &str,
    user_id: Option<&str>,
    email: &str,
    amount: i64,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO discount_redemptions (discount_id, booking_id, user_id, email, amount) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(discount_id, booking_id) DO NOTHING",
        params![discount_id, booking_id, user_id, email.trim().to_lowercase(), amount],
    )?;
    Ok(())
}

/// Id of a booking still awaiting payment that carries the voucher code for
/// the same customer, other than `exclude_booking`.
pub fn find_open_booking_with_voucher(
    conn: &Connection,
    code: &str,
    user_id: Option<&str>,
    email: Option<&str>,
    exclude_booking: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let email = email.map(|e| e.trim().to_lowercase());
    Ok(conn
        .query_row(
            "SELECT b.id FROM bookings b, json_each(b.applied_vouchers) v
             WHERE b.status = 'pending' AND b.payment_status = 'pending'
               AND json_extract(v.value, '$.code') = ?1
               AND (b.user_id = ?2 OR lower(b.email) = ?3)
               AND b.id != COALESCE(?4, '')
             ORDER BY b.created_at ASC LIMIT 1",
            params![code, user_id, email, exclude_booking],
            |row| row.get(0),
        )
        .optional()?)
}

// ── Points ──

fn parse_points_row(row: &rusqlite::Row) -> rusqlite::Result<PointsTransaction> {
    let created_at: String = row.get(5)?;
    Ok(PointsTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        booking_id: row.get(2)?,
        amount: row.get(3)?,
        points: row.get(4)?,
        created_at: parse_ts(&created_at),
    })
}

pub fn insert_points_transaction(conn: &Connection, tx: &PointsTransaction) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO points_transactions (id, user_id, booking_id, amount, points, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tx.id,
            tx.user_id,
            tx.booking_id,
            tx.amount,
            tx.points,
            format_ts(&tx.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_points_transaction_for_booking(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Option<PointsTransaction>> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, booking_id, amount, points, created_at
             FROM points_transactions WHERE booking_id = ?1",
            params![booking_id],
            parse_points_row,
        )
        .optional()?)
}

pub fn get_recent_points_transactions(
    conn: &Connection,
    user_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<PointsTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, booking_id, amount, points, created_at
         FROM points_transactions WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], parse_points_row)?;

    let mut transactions = vec![];
    for row in rows {
        transactions.push(row?);
    }
    Ok(transactions)
}

// ── Rewards ──

fn parse_reward_row(row: &rusqlite::Row) -> rusqlite::Result<Reward> {
    let level: String = row.get(3)?;
    Ok(Reward {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        membership_level: MembershipLevel::parse(&level).unwrap_or(MembershipLevel::Bronze),
        points_required: row.get(4)?,
        voucher_code: row.get(5)?,
        active: row.get::<_, i32>(6)? != 0,
    })
}

pub fn save_reward(conn: &Connection, reward: &Reward) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO rewards (id, name, description, membership_level, points_required, voucher_code, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           description = excluded.description,
           membership_level = excluded.membership_level,
           points_required = excluded.points_required,
           voucher_code = excluded.voucher_code,
           active = excluded.active",
        params![
            reward.id,
            reward.name,
            reward.description,
            reward.membership_level.as_str(),
            reward.points_required,
            reward.voucher_code,
            reward.active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_reward(conn: &Connection, id: &str) -> anyhow::Result<Option<Reward>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description, membership_level, points_required, voucher_code, active
             FROM rewards WHERE id = ?1",
            params![id],
            parse_reward_row,
        )
        .optional()?)
}

pub fn list_rewards(conn: &Connection, active_only: bool) -> anyhow::Result<Vec<Reward>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, membership_level, points_required, voucher_code, active
         FROM rewards WHERE active = 1 OR ?1 = 0 ORDER BY points_required ASC",
    )?;
    let rows = stmt.query_map(params![active_only as i32], parse_reward_row)?;

    let mut rewards = vec![];
    for row in rows {
        rewards.push(row?);
    }
    Ok(rewards)
}

/// Hard delete when never redeemed, otherwise deactivate to keep history intact.
pub fn delete_reward(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let redeemed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reward_redemptions WHERE reward_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    let count = if redeemed > 0 {
        conn.execute("UPDATE rewards SET active = 0 WHERE id = ?1", params![id])?
    } else {
        conn.execute("DELETE FROM rewards WHERE id = ?1", params![id])?
    };
    Ok(count > 0)
}

pub fn insert_reward_redemption(
    conn: &Connection,
    redemption: &RewardRedemption,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reward_redemptions (id, user_id, reward_id, reward_name, points_spent, voucher_code, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            redemption.id,
            redemption.user_id,
            redemption.reward_id,
            redemption.reward_name,
            redemption.points_spent,
            redemption.voucher_code,
            format_ts(&redemption.created_at),
        ],
    )?;
    Ok(())
}

pub fn list_reward_redemptions(
    conn: &Connection,
    user_id: &str,
) -> anyhow::Result<Vec<RewardRedemption>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, reward_id, reward_name, points_spent, voucher_code, created_at
         FROM reward_redemptions WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        let created_at: String = row.get(6)?;
        Ok(RewardRedemption {
            id: row.get(0)?,
            user_id: row.get(1)?,
            reward_id: row.get(2)?,
            reward_name: row.get(3)?,
            points_spent: row.get(4)?,
            voucher_code: row.get(5)?,
            created_at: parse_ts(&created_at),
        })
    })?;

    let mut redemptions = vec![];
    for row in rows {
        redemptions.push(row?);
    }
    Ok(redemptions)
}

// ── Reviews ──

const REVIEW_COLUMNS: &str =
    "id, hotel_id, room_id, user_name, email, rating, comment, is_hidden, is_deleted, created_at";

fn parse_review_row(row: &rusqlite::Row) -> rusqlite::Result<Review> {
    let created_at: String = row.get(9)?;
    Ok(Review {
        id: row.get(0)?,
        hotel_id: row.get(1)?,
        room_id: row.get(2)?,
        user_name: row.get(3)?,
        email: row.get(4)?,
        rating: row.get(5)?,
        comment: row.get(6)?,
        is_hidden: row.get(7)?,
        is_deleted: row.get(8)?,
        created_at: parse_ts(&created_at),
    })
}

pub fn insert_review(conn: &Connection, review: &Review) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reviews (id, hotel_id, room_id, user_name, email, rating, comment, is_hidden, is_deleted, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            review.id,
            review.hotel_id,
            review.room_id,
            review.user_name,
            review.email,
            review.rating,
            review.comment,
            review.is_hidden,
            review.is_deleted,
            format_ts(&review.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_review(conn: &Connection, id: &str) -> anyhow::Result<Option<Review>> {
    let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1 AND is_deleted = 0");
    Ok(conn.query_row(&sql, params![id], parse_review_row).optional()?)
}

/// Filters for a review listing. `hidden: None` lists both visible and
/// hidden reviews; soft-deleted ones never show.
pub struct ReviewFilter<'a> {
    pub hotel_id: Option<&'a str>,
    pub room_id: Option<&'a str>,
    pub hidden: Option<bool>,
}

/// One page of reviews, newest first, plus the total matching count.
pub fn list_reviews(
    conn: &Connection,
    filter: &ReviewFilter,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<Review>, i64)> {
    const WHERE: &str = "is_deleted = 0
         AND (?1 IS NULL OR hotel_id = ?1)
         AND (?2 IS NULL OR room_id = ?2)
         AND (?3 IS NULL OR is_hidden = ?3)";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM reviews WHERE {WHERE}"),
        params![filter.hotel_id, filter.room_id, filter.hidden],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE {WHERE}
         ORDER BY created_at DESC, rowid DESC LIMIT ?4 OFFSET ?5"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![filter.hotel_id, filter.room_id, filter.hidden, limit, offset],
        parse_review_row,
    )?;

    let mut reviews = vec![];
    for row in rows {
        reviews.push(row?);
    }
    Ok((reviews, total))
}

pub fn list_reviews_by_email(conn: &Connection, email: &str) -> anyhow::Result<Vec<Review>> {
    let sql = format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE email = ?1 AND is_deleted = 0
         ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![email.trim().to_lowercase()], parse_review_row)?;

    let mut reviews = vec![];
    for row in rows {
        reviews.push(row?);
    }
    Ok(reviews)
}

/// Average over visible reviews of a hotel, optionally one room.
pub fn review_summary(
    conn: &Connection,
    hotel_id: Option<&str>,
    room_id: Option<&str>,
) -> anyhow::Result<RatingSummary> {
    let (sum, count): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(rating), 0), COUNT(*) FROM reviews
         WHERE is_deleted = 0 AND is_hidden = 0
           AND (?1 IS NULL OR hotel_id = ?1)
           AND (?2 IS NULL OR room_id = ?2)",
        params![hotel_id, room_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(RatingSummary::from_totals(sum, count))
}

pub fn set_review_hidden(conn: &Connection, id: &str, hidden: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE reviews SET is_hidden = ?1 WHERE id = ?2 AND is_deleted = 0",
        params![hidden, id],
    )?;
    Ok(count > 0)
}

pub fn soft_delete_review(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE reviews SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0",
        params![id],
    )?;
    Ok(count > 0)
}

/// Whether the email holds a confirmed, paid stay at the hotel (or the one
/// room, when given).
pub fn has_paid_stay(
    conn: &Connection,
    email: &str,
    hotel_id: &str,
    room_id: Option<&str>,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings b JOIN rooms r ON r.id = b.room_id
         WHERE lower(b.email) = ?1 AND r.hotel_id = ?2
           AND (?3 IS NULL OR b.room_id = ?3)
           AND b.status = 'confirmed' AND b.payment_status = 'paid'",
        params![email.trim().to_lowercase(), hotel_id, room_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Unmatched payments ──

/// Keeps a gateway capture that could not settle its booking. Repeat
/// callbacks for the same transaction are ignored.
pub fn record_unmatched_payment(
    conn: &Connection,
    booking_id: &str,
    gateway: &str,
    transaction_ref: &str,
    amount: i64,
    reason: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT INTO unmatched_payments (id, booking_id, gateway, transaction_ref, amount, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(gateway, transaction_ref) DO NOTHING",
        params![
            uuid::Uuid::new_v4().to_string(),
            booking_id,
            gateway,
            transaction_ref,
            amount,
            reason,
            format_ts(&crate::models::dates::now()),
        ],
    )?;
    Ok(count > 0)
}

pub fn count_unmatched_payments(conn: &Connection, booking_id: &str) -> anyhow::Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM unmatched_payments WHERE booking_id = ?1",
        params![booking_id],
        |row| row.get(0),
    )?)
}
