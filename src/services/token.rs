use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::model::user::User;

const TOKEN_LEN: usize = 60;

/// 60 random alphanumerics, then the owner id, so two identities can never
/// share a value.
pub fn generate(user_id: u64) -> String {
    let random: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("{random}-{user_id}")
}

pub fn cycle(user: &mut User) {
    user.token = generate(user.id);
}
