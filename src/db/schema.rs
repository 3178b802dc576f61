table! {
    csrf_states (state_key) {
        state_key -> Text,
        metadata -> Text,
        expires_at -> Int8,
    }
}

table! {
    revoked_tokens (jti) {
        jti -> Text,
        user_id -> Nullable<Text>,
        reason -> Text,
        expires_at -> Int8,
        revoked_at -> Int8,
    }
}

table! {
    revoked_users (user_id) {
        user_id -> Text,
        reason -> Text,
        revoked_at -> Int8,
    }
}

table! {
    saml_replays (assertion_id) {
        assertion_id -> Text,
        expires_at -> Int8,
        first_seen -> Int8,
    }
}

allow_tables_to_appear_in_same_query!(csrf_states, revoked_tokens, revoked_users, saml_replays,);
