//! Lua scripts for the delay queue.
//!
//! The queue is two keys:
//! - a sorted set of task keys scored by due time (unix millis)
//! - a hash of task key -> JSON payload
//!
//! Both scripts touch both keys in one atomic step, so a task is never
//! visible in one without the other, and a due task is handed to exactly one
//! poller.

/// Schedule (or re-arm) a task.
///
/// Arguments:
/// - KEYS[1]: Sorted set key
/// - KEYS[2]: Payload hash key
/// - ARGV[1]: Task key
/// - ARGV[2]: Due time (unix millis)
/// - ARGV[3]: Task payload (JSON string)
///
/// Returns:
/// - 1: Task newly scheduled
/// - 0: Existing entry replaced
pub const SCHEDULE: &str = r#"
redis.call('HSET', KEYS[2], ARGV[1], ARGV[3])
return redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
"#;

/// Pop every task that is due.
///
/// Arguments:
/// - KEYS[1]: Sorted set key
/// - KEYS[2]: Payload hash key
/// - ARGV[1]: Now (unix millis)
/// - ARGV[2]: Maximum number of tasks to pop
///
/// Returns:
/// - Array of task payloads (JSON strings), oldest first
pub const POP_DUE: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local payloads = {}

for _, member in ipairs(due) do
    redis.call('ZREM', KEYS[1], member)
    local payload = redis.call('HGET', KEYS[2], member)
    redis.call('HDEL', KEYS[2], member)
    if payload then
        table.insert(payloads, payload)
    end
end

return payloads
"#;
