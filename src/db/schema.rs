diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    videos (id) {
        id -> Integer,
        user_id -> Integer,
        title -> Text,
        filename -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    comments (id) {
        id -> Integer,
        video_id -> Integer,
        user_id -> Integer,
        parent_id -> Nullable<Integer>,
        content -> Text,
        created_at -> Timestamp,
    }
}

diesel::joinable!(videos -> users (user_id));
diesel::joinable!(comments -> videos (video_id));
diesel::joinable!(comments -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(comments, users, videos,);
