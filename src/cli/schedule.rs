use chama::clock::{Clock, SystemClock};
use chama::group::schedule::{build_schedule, cycle_length_days};
use chama::group::{
    GroupId, JoinOrder, Member, MemberId, MemberStatus, PayoutOrderStrategy, Role, ScheduleEntry,
    SeededShuffle, UserId,
};
use std::time::{Duration, UNIX_EPOCH};

/// Preview a payout rotation without touching any stored group
///
/// Members are numbered by join position (1 joined first). Without a seed
/// the rotation follows join order.
pub fn execute(
    members: u32,
    amount: u64,
    period_days: u32,
    start: Option<u64>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if members == 0 {
        return Err("--members must be at least 1".into());
    }
    if amount == 0 || period_days == 0 {
        return Err("--amount and --period-days must be positive".into());
    }
    let start = start.unwrap_or_else(|| SystemClock.now_secs());

    let rows = preview(members, amount, period_days, start, seed)?;

    println!(
        "{} rounds over {} days, pool {} per round",
        rows.len(),
        cycle_length_days(members, period_days),
        rows.first().map(|(_, e)| e.amount).unwrap_or(0)
    );
    if let Some(seed) = seed {
        println!("Order shuffled with seed {}", seed);
    }
    println!();
    for (position, entry) in &rows {
        let due = UNIX_EPOCH + Duration::from_secs(entry.due_date);
        println!(
            "Round {:>3}  member {:>3}  due {}",
            entry.round,
            position,
            humantime::format_rfc3339_seconds(due)
        );
    }
    Ok(())
}

/// Schedule rows paired with the recipient's join position.
fn preview(
    members: u32,
    amount: u64,
    period_days: u32,
    start: u64,
    seed: Option<u64>,
) -> Result<Vec<(usize, ScheduleEntry)>, Box<dyn std::error::Error>> {
    let group = GroupId::new();
    let roster: Vec<Member> = (0..members)
        .map(|i| Member {
            id: MemberId::new(),
            group,
            user: UserId::new(),
            wallet: String::new(),
            role: if i == 0 { Role::Creator } else { Role::Member },
            status: MemberStatus::Approved,
            joined_at: start + u64::from(i),
        })
        .collect();
    let refs: Vec<&Member> = roster.iter().collect();

    let order = match seed {
        Some(seed) => SeededShuffle::new(seed).propose(&refs),
        None => JoinOrder.propose(&refs),
    };
    let entries = build_schedule(group, &order, amount, period_days, start)?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let position = roster
                .iter()
                .position(|m| m.id == entry.member)
                .map(|i| i + 1)
                .unwrap_or(0);
            (position, entry)
        })
        .collect())
}
